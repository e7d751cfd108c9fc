//! Compliance policy build-range synchronization
//!
//! Rebuilds a Windows compliance policy's valid OS build ranges from the
//! most recent quality updates in the Windows Update catalog, and optionally
//! points a quality update profile's expedite settings at the oldest build
//! still considered compliant.

use crate::config::{BuildRangesConfig, Config};
use crate::error::Result;
use crate::graph::intune::{self, CompliancePolicy, OperatingSystemVersionRange};
use crate::graph::windows_updates::{self, ProductRevision};
use crate::graph::GraphClient;
use crate::reconcile::build_range::{build_ranges, expedite_label, expedite_settings};
use crate::reconcile::RunReport;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct BuildRangesArgs {
    /// Compute and show the ranges without updating any policy
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: BuildRangesArgs, config: &Config) -> Result<()> {
    let cfg = config.build_ranges()?;

    println!("{} compliance build ranges...", "Synchronizing".cyan().bold());
    println!("→ Policy: {}", cfg.policy_id.cyan());
    println!(
        "→ Catalog: {} most recent {} update(s)",
        cfg.catalog_entry_count,
        cfg.classification.as_str().cyan()
    );
    if cfg.allow_newer_builds {
        println!("→ High bound: {}", "<build>.9999".cyan());
    }

    let graph = super::connect(config).await?;
    let report = sync(&graph, cfg, args.dry_run).await?;
    super::print_report(&report, args.dry_run);

    Ok(())
}

/// Fetch the catalog, build the ranges, and update the policies (unless `dry_run`)
pub async fn sync(graph: &GraphClient, cfg: &BuildRangesConfig, dry_run: bool) -> Result<RunReport> {
    let (revisions, mut report) = fetch_catalog_revisions(graph, cfg).await?;
    println!("→ {} product revision(s) in catalog window", revisions.len());

    let set = build_ranges(cfg, &revisions)?;

    for prefix in &set.skipped {
        println!("  {} {}: no matching catalog revisions", "✗".red(), prefix);
        report.record_failure(format!("build {}", prefix), "no matching catalog revisions");
    }

    println!("\n{} Build ranges:", "→".cyan().bold());
    for range in &set.ranges {
        println!(
            "  {} {} .. {}  ({})",
            "•".cyan(),
            range.lowest_version,
            range.highest_version,
            range.description.as_deref().unwrap_or("")
        );
    }

    let policy = intune::get_compliance_policy(graph, &cfg.policy_id).await?;
    report.merge(apply_compliance_ranges(graph, &policy, &set.ranges, dry_run).await);

    if cfg.expedite.enabled {
        report.merge(apply_expedite(graph, cfg, set.expedite_release, dry_run).await);
    }

    Ok(report)
}

/// Product revisions of the top-N catalog entries of the configured classification
///
/// Listing the catalog is fatal on failure; a failed revision lookup for one
/// entry is recorded in the returned report.
pub async fn fetch_catalog_revisions(
    graph: &GraphClient,
    cfg: &BuildRangesConfig,
) -> Result<(Vec<ProductRevision>, RunReport)> {
    let entries = windows_updates::list_quality_catalog_entries(graph).await?;

    let selected: Vec<_> = entries
        .into_iter()
        .filter(|e| cfg.classification.matches(e.quality_update_classification.as_deref()))
        .take(cfg.catalog_entry_count)
        .collect();

    let mut report = RunReport::default();
    let mut revisions = Vec::new();

    for entry in &selected {
        let name = entry.display_name.as_deref().unwrap_or(&entry.id);
        tracing::debug!("Catalog entry {} released {}", name, entry.release_date_time);

        match windows_updates::list_catalog_entry_revisions(graph, &entry.id).await {
            Ok(found) => revisions.extend(found),
            Err(e) => report.record_failure(format!("catalog entry {}", name), e),
        }
    }

    Ok((revisions, report))
}

/// Replace the policy's build ranges when they differ
pub async fn apply_compliance_ranges(
    graph: &GraphClient,
    policy: &CompliancePolicy,
    ranges: &[OperatingSystemVersionRange],
    dry_run: bool,
) -> RunReport {
    let mut report = RunReport::default();
    let name = policy.display_name.as_deref().unwrap_or(&policy.id);

    if policy.has_build_ranges(ranges) {
        println!("{} '{}' build ranges already up to date", "✓".green(), name);
        return report;
    }

    if dry_run {
        println!("{} '{}' build ranges would be replaced", "ℹ".yellow(), name);
        report.planned += 1;
        return report;
    }

    match intune::update_compliance_build_ranges(graph, policy, ranges).await {
        Ok(()) => {
            report.writes += 1;
            println!("{} '{}' build ranges updated", "✓".green(), name);
        }
        Err(e) => {
            println!("{} '{}' update failed: {}", "✗".red(), name, e);
            report.record_failure(format!("compliance policy {}", name), e);
        }
    }

    report
}

/// Point the quality update profile's expedite settings at `release`
pub async fn apply_expedite(
    graph: &GraphClient,
    cfg: &BuildRangesConfig,
    release: DateTime<Utc>,
    dry_run: bool,
) -> RunReport {
    let mut report = RunReport::default();
    let profile_id = &cfg.expedite.policy_id;

    let profile = match intune::get_quality_update_profile(graph, profile_id).await {
        Ok(profile) => profile,
        Err(e) => {
            println!("{} quality update profile {}: {}", "✗".red(), profile_id, e);
            report.record_failure(format!("quality update profile {}", profile_id), e);
            return report;
        }
    };

    let name = profile.display_name.as_deref().unwrap_or(&profile.id);
    let settings = expedite_settings(release, cfg.expedite.days_until_forced_reboot);
    let label = expedite_label(release, cfg.classification);

    if profile.expedited_update_settings.as_ref() == Some(&settings)
        && profile.release_date_display_name.as_deref() == Some(label.as_str())
    {
        println!("{} '{}' expedite settings already up to date", "✓".green(), name);
        return report;
    }

    println!(
        "→ Expedite: {} (reboot after {} day(s))",
        label.cyan(),
        cfg.expedite.days_until_forced_reboot
    );

    if dry_run {
        report.planned += 1;
        return report;
    }

    match intune::update_expedite_settings(graph, &profile.id, &settings, &label).await {
        Ok(()) => {
            report.writes += 1;
            println!("{} '{}' expedite settings updated", "✓".green(), name);
        }
        Err(e) => {
            println!("{} '{}' update failed: {}", "✗".red(), name, e);
            report.record_failure(format!("quality update profile {}", name), e);
        }
    }

    report
}
