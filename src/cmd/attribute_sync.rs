//! Extension attribute reconciliation
//!
//! Tags Entra ID devices whose latest custom attribute script result equals
//! the desired value, and clears the tag everywhere else, so Conditional
//! Access device filters can target them.

use crate::config::{AttributeSyncConfig, Config};
use crate::error::Result;
use crate::graph::intune;
use crate::graph::GraphClient;
use crate::reconcile::attribute::{
    is_valid_object_id, plan_attribute_changes, AttributePlan, DeviceTarget,
};
use crate::reconcile::RunReport;
use clap::Args;
use colored::Colorize;
use std::collections::HashSet;

#[derive(Args, Debug)]
pub struct AttributeSyncArgs {
    /// Compute and show the changes without writing them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: AttributeSyncArgs, config: &Config) -> Result<()> {
    let cfg = config.attribute_sync()?;

    println!("{} extension attribute...", "Reconciling".cyan().bold());
    println!("→ Script: {}", cfg.script_id.cyan());
    println!("→ Desired result: {}", cfg.desired_result.cyan());
    println!(
        "→ Attribute: {} = {}",
        cfg.attribute_name().cyan(),
        cfg.sentinel_value.cyan()
    );

    let graph = super::connect(config).await?;
    let report = sync(&graph, cfg, args.dry_run).await?;
    super::print_report(&report, args.dry_run);

    Ok(())
}

/// Fetch both device sets, plan, and apply (unless `dry_run`)
pub async fn sync(graph: &GraphClient, cfg: &AttributeSyncConfig, dry_run: bool) -> Result<RunReport> {
    let DesiredDevices {
        devices: desired,
        already_tagged,
        mut report,
    } = fetch_desired_devices(graph, cfg).await?;
    println!(
        "→ {} device(s) report '{}'",
        desired.len(),
        cfg.desired_result
    );

    let mut tagged = fetch_tagged_devices(graph, cfg).await?;
    println!(
        "→ {} {} device(s) carry '{}'",
        tagged.len(),
        cfg.operating_system,
        cfg.sentinel_value
    );

    // desired devices outside the listed OS family may already carry the value
    tagged.extend(already_tagged);

    let plan = plan_attribute_changes(&desired, &tagged);

    if plan.is_empty() {
        println!("{} Extension attributes already up to date", "✓".green());
        return Ok(report);
    }

    if dry_run {
        print_plan(&plan, cfg);
        report.planned += plan.len();
        return Ok(report);
    }

    report.merge(apply_attribute_plan(graph, cfg, &plan).await);
    Ok(report)
}

/// Result of resolving the script's compliant devices in the directory
#[derive(Debug, Default)]
pub struct DesiredDevices {
    pub devices: Vec<DeviceTarget>,
    /// Subset of `devices` whose directory entry already holds the sentinel
    pub already_tagged: Vec<DeviceTarget>,
    /// Per-device lookup failures
    pub report: RunReport,
}

/// Devices whose latest run of the script returned the desired result
///
/// Failing to list run states is fatal; a failed per-device lookup is
/// recorded in the returned report and the device is left out.
pub async fn fetch_desired_devices(
    graph: &GraphClient,
    cfg: &AttributeSyncConfig,
) -> Result<DesiredDevices> {
    let run_states =
        intune::list_script_run_states(graph, &cfg.script_id, &cfg.desired_result).await?;

    let mut desired = DesiredDevices::default();
    let mut seen = HashSet::new();

    for state in run_states {
        if state.result_message.as_deref() != Some(cfg.desired_result.as_str()) {
            continue;
        }

        let Some(device) = state.managed_device else {
            tracing::debug!("Run state {} has no managed device", state.id);
            continue;
        };

        let name = device.device_name.clone().unwrap_or_else(|| device.id.clone());

        let aad_device_id = match device.azure_ad_device_id.as_deref() {
            Some(id) if is_valid_object_id(Some(id)) => id.to_string(),
            _ => {
                tracing::debug!("{} is not registered in Entra ID, skipping", name);
                continue;
            }
        };

        if !seen.insert(aad_device_id.to_ascii_lowercase()) {
            continue;
        }

        match intune::find_directory_device(graph, &aad_device_id).await {
            Ok(Some(entry)) if is_valid_object_id(Some(&entry.id)) => {
                let carries_sentinel = entry.extension_attribute(cfg.extension_attribute)
                    == Some(cfg.sentinel_value.as_str());
                let target = DeviceTarget::new(entry.id, name);
                if carries_sentinel {
                    desired.already_tagged.push(target.clone());
                }
                desired.devices.push(target);
            }
            Ok(_) => {
                tracing::warn!("No directory object for {} ({})", name, aad_device_id);
            }
            Err(e) => desired
                .report
                .record_failure(format!("lookup {}", name), e),
        }
    }

    Ok(desired)
}

/// Directory devices of the configured OS currently carrying the sentinel
pub async fn fetch_tagged_devices(
    graph: &GraphClient,
    cfg: &AttributeSyncConfig,
) -> Result<Vec<DeviceTarget>> {
    let devices = intune::list_directory_devices(graph, &cfg.operating_system).await?;

    Ok(devices
        .into_iter()
        .filter(|d| d.extension_attribute(cfg.extension_attribute) == Some(cfg.sentinel_value.as_str()))
        .map(|d| {
            let name = d.display_name.clone().unwrap_or_else(|| d.id.clone());
            DeviceTarget::new(d.id, name)
        })
        .collect())
}

/// One PATCH per device; failures are recorded and the batch continues
pub async fn apply_attribute_plan(
    graph: &GraphClient,
    cfg: &AttributeSyncConfig,
    plan: &AttributePlan,
) -> RunReport {
    let mut report = RunReport::default();
    let attribute = cfg.attribute_name();

    let writes = plan
        .to_set
        .iter()
        .map(|d| (d, Some(cfg.sentinel_value.as_str())))
        .chain(plan.to_clear.iter().map(|d| (d, None)));

    for (device, value) in writes {
        let action = if value.is_some() { "set" } else { "clear" };

        match intune::set_extension_attribute(graph, &device.object_id, cfg.extension_attribute, value)
            .await
        {
            Ok(()) => {
                report.writes += 1;
                println!(
                    "  {} {} {} on {}",
                    "✓".green(),
                    action,
                    attribute,
                    device.name
                );
            }
            Err(e) => {
                println!("  {} {} {} on {}: {}", "✗".red(), action, attribute, device.name, e);
                report.record_failure(format!("{} {}", action, device.name), e);
            }
        }
    }

    report
}

fn print_plan(plan: &AttributePlan, cfg: &AttributeSyncConfig) {
    println!(
        "\n{} DRY RUN - {} would be changed on:",
        "ℹ".yellow().bold(),
        cfg.attribute_name()
    );
    for device in &plan.to_set {
        println!("  {} set   {} ({})", "+".green(), device.name, device.object_id);
    }
    for device in &plan.to_clear {
        println!("  {} clear {} ({})", "-".red(), device.name, device.object_id);
    }
}
