//! Compliance build ranges from catalog product revisions

use crate::config::{BuildRangesConfig, UpdateClassification};
use crate::error::{IntuneSyncError, Result};
use crate::graph::intune::{ExpeditedUpdateSettings, OperatingSystemVersionRange};
use crate::graph::windows_updates::ProductRevision;
use chrono::{DateTime, Datelike, NaiveTime, Utc};
use regex::Regex;

lazy_static::lazy_static! {
    static ref BUILD_VERSION: Regex = Regex::new(r"^\d+\.\d+\.\d+\.\d+$").unwrap();
}

pub const WILDCARD_REVISION: &str = "9999";

/// Full four-part build number such as `10.0.22631.4317`
pub fn is_build_version(version: &str) -> bool {
    BUILD_VERSION.is_match(version)
}

/// `version` contains `prefix` as a whole run of dotted components
pub fn matches_prefix(version: &str, prefix: &str) -> bool {
    format!(".{}.", version).contains(&format!(".{}.", prefix))
}

fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRangeSet {
    /// One range per matched prefix, in configured order
    pub ranges: Vec<OperatingSystemVersionRange>,
    /// Prefixes without any catalog match
    pub skipped: Vec<String>,
    /// Release time of the earliest lowest-version revision across all ranges
    pub expedite_release: DateTime<Utc>,
}

/// Build one version range per configured prefix
///
/// Errors when no prefix matched any revision.
pub fn build_ranges(config: &BuildRangesConfig, revisions: &[ProductRevision]) -> Result<BuildRangeSet> {
    let mut ranges = Vec::new();
    let mut skipped = Vec::new();
    let mut expedite_release: Option<DateTime<Utc>> = None;

    for build in &config.builds {
        let mut matching: Vec<(DateTime<Utc>, &ProductRevision)> = revisions
            .iter()
            .filter(|r| is_build_version(&r.version) && matches_prefix(&r.version, &build.prefix))
            .filter_map(|r| match r.release_date_time {
                Some(released) => Some((released, r)),
                None => {
                    tracing::warn!("Revision {} has no release time, ignoring", r.version);
                    None
                }
            })
            .collect();

        if matching.is_empty() {
            skipped.push(build.prefix.clone());
            continue;
        }

        matching.sort_by(|(a_released, a), (b_released, b)| {
            a_released
                .cmp(b_released)
                .then_with(|| version_key(&a.version).cmp(&version_key(&b.version)))
        });

        // non-empty: checked above
        let (lowest_released, lowest) = matching[0];
        let (_, latest) = matching[matching.len() - 1];

        let highest_version = if config.allow_newer_builds {
            format!("{}.{}", build.prefix, WILDCARD_REVISION)
        } else {
            latest.version.clone()
        };

        tracing::debug!(
            "Build {}: {} ({}) .. {}",
            build.prefix,
            lowest.version,
            lowest_released,
            highest_version
        );

        expedite_release = Some(match expedite_release {
            Some(current) => current.min(lowest_released),
            None => lowest_released,
        });

        ranges.push(OperatingSystemVersionRange::new(
            build.description(),
            &lowest.version,
            &highest_version,
        ));
    }

    match expedite_release {
        Some(expedite_release) => Ok(BuildRangeSet {
            ranges,
            skipped,
            expedite_release,
        }),
        None => Err(IntuneSyncError::NoBuildRanges(format!(
            "none of {} matched the {} most recent {} catalog entries",
            config
                .builds
                .iter()
                .map(|b| b.prefix.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            config.catalog_entry_count,
            config.classification.as_str()
        ))),
    }
}

/// Expedite settings targeting the release day of `release`
pub fn expedite_settings(release: DateTime<Utc>, days_until_forced_reboot: u8) -> ExpeditedUpdateSettings {
    let midnight = release.date_naive().and_time(NaiveTime::MIN).and_utc();
    ExpeditedUpdateSettings {
        quality_update_release: Some(midnight),
        days_until_forced_reboot: Some(days_until_forced_reboot),
    }
}

/// `releaseDateDisplayName` shown in Intune, e.g.
/// `October 8, 2024 - 2024.10 Security Quality Update`
pub fn expedite_label(release: DateTime<Utc>, classification: UpdateClassification) -> String {
    let kind = match classification.label() {
        "" => "Quality Update".to_string(),
        label => format!("{} Quality Update", label),
    };

    format!(
        "{} {}, {} - {}.{:02} {}",
        release.format("%B"),
        release.day(),
        release.year(),
        release.year(),
        release.month(),
        kind
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildSpec, ExpediteConfig};

    fn revision(version: &str, released: &str) -> ProductRevision {
        ProductRevision {
            id: version.to_string(),
            display_name: None,
            version: version.to_string(),
            release_date_time: Some(released.parse().unwrap()),
        }
    }

    fn config(prefixes: &[&str], allow_newer_builds: bool) -> BuildRangesConfig {
        BuildRangesConfig {
            policy_id: "policy-1".into(),
            classification: UpdateClassification::Security,
            catalog_entry_count: 3,
            allow_newer_builds,
            builds: prefixes
                .iter()
                .map(|p| BuildSpec {
                    prefix: p.to_string(),
                    description: None,
                })
                .collect(),
            expedite: ExpediteConfig::default(),
        }
    }

    fn catalog() -> Vec<ProductRevision> {
        vec![
            revision("10.0.22631.4317", "2024-10-08T17:00:00Z"),
            revision("10.0.22631.4169", "2024-09-10T17:00:00Z"),
            revision("10.0.22631.4037", "2024-08-13T17:00:00Z"),
            revision("10.0.19045.5011", "2024-10-08T17:00:00Z"),
            revision("10.0.19045.4894", "2024-09-10T17:00:00Z"),
            revision("10.0.26100.2033", "2024-10-08T17:00:00Z"),
        ]
    }

    #[test]
    fn test_lowest_and_highest_by_release() {
        let set = build_ranges(&config(&["10.0.22631", "10.0.19045"], false), &catalog()).unwrap();

        assert_eq!(
            set.ranges,
            vec![
                OperatingSystemVersionRange::new("10.0.22631", "10.0.22631.4037", "10.0.22631.4317"),
                OperatingSystemVersionRange::new("10.0.19045", "10.0.19045.4894", "10.0.19045.5011"),
            ]
        );
        assert!(set.skipped.is_empty());
        assert_eq!(set.expedite_release, "2024-08-13T17:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_wildcard_high_bound() {
        let set = build_ranges(&config(&["10.0.26100"], true), &catalog()).unwrap();
        assert_eq!(set.ranges[0].lowest_version, "10.0.26100.2033");
        assert_eq!(set.ranges[0].highest_version, "10.0.26100.9999");
    }

    #[test]
    fn test_unmatched_prefix_is_skipped() {
        let set = build_ranges(&config(&["10.0.17763", "10.0.26100"], false), &catalog()).unwrap();
        assert_eq!(set.skipped, vec!["10.0.17763".to_string()]);
        assert_eq!(set.ranges.len(), 1);
        assert_eq!(set.expedite_release, "2024-10-08T17:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_no_matches_is_an_error() {
        let err = build_ranges(&config(&["10.0.17763"], false), &catalog()).unwrap_err();
        assert!(matches!(err, IntuneSyncError::NoBuildRanges(_)));
        assert!(build_ranges(&config(&["10.0.22631"], false), &[]).is_err());
    }

    #[test]
    fn test_prefix_matches_whole_components() {
        assert!(matches_prefix("10.0.22631.4317", "10.0.22631"));
        assert!(matches_prefix("10.0.22631.4317", "22631"));
        assert!(!matches_prefix("10.0.22631.4317", "10.0.2263"));
        assert!(!matches_prefix("10.0.122631.1", "22631"));
    }

    #[test]
    fn test_malformed_versions_are_ignored() {
        let revisions = vec![
            revision("10.0.22631", "2024-01-09T00:00:00Z"),
            revision("10.0.22631.4317", "2024-10-08T00:00:00Z"),
        ];
        let set = build_ranges(&config(&["10.0.22631"], false), &revisions).unwrap();
        assert_eq!(set.ranges[0].lowest_version, "10.0.22631.4317");
        assert_eq!(set.ranges[0].highest_version, "10.0.22631.4317");
    }

    #[test]
    fn test_revisions_without_release_time_are_ignored() {
        let mut undated = revision("10.0.22631.3000", "2024-01-09T00:00:00Z");
        undated.release_date_time = None;
        let revisions = vec![undated, revision("10.0.22631.4317", "2024-10-08T00:00:00Z")];

        let set = build_ranges(&config(&["10.0.22631"], false), &revisions).unwrap();
        assert_eq!(set.ranges[0].lowest_version, "10.0.22631.4317");

        let mut only_undated = revision("10.0.19045.5011", "2024-10-08T00:00:00Z");
        only_undated.release_date_time = None;
        let set = build_ranges(&config(&["10.0.19045", "10.0.22631"], false), &[
            only_undated,
            revision("10.0.22631.4317", "2024-10-08T00:00:00Z"),
        ])
        .unwrap();
        assert_eq!(set.skipped, vec!["10.0.19045".to_string()]);
    }

    #[test]
    fn test_same_release_time_orders_by_version() {
        let revisions = vec![
            revision("10.0.22631.4320", "2024-10-08T00:00:00Z"),
            revision("10.0.22631.4317", "2024-10-08T00:00:00Z"),
        ];
        let set = build_ranges(&config(&["10.0.22631"], false), &revisions).unwrap();
        assert_eq!(set.ranges[0].lowest_version, "10.0.22631.4317");
        assert_eq!(set.ranges[0].highest_version, "10.0.22631.4320");
    }

    #[test]
    fn test_description_from_config() {
        let mut cfg = config(&["10.0.22631"], false);
        cfg.builds[0].description = Some("Windows 11 23H2".into());
        let set = build_ranges(&cfg, &catalog()).unwrap();
        assert_eq!(set.ranges[0].description.as_deref(), Some("Windows 11 23H2"));
    }

    #[test]
    fn test_expedite_settings_truncate_to_midnight() {
        let settings = expedite_settings("2024-10-08T17:00:00Z".parse().unwrap(), 1);
        assert_eq!(
            settings.quality_update_release,
            Some("2024-10-08T00:00:00Z".parse().unwrap())
        );
        assert_eq!(settings.days_until_forced_reboot, Some(1));
    }

    #[test]
    fn test_expedite_label() {
        let release = "2024-10-08T17:00:00Z".parse().unwrap();
        assert_eq!(
            expedite_label(release, UpdateClassification::Security),
            "October 8, 2024 - 2024.10 Security Quality Update"
        );
        assert_eq!(
            expedite_label(release, UpdateClassification::All),
            "October 8, 2024 - 2024.10 Quality Update"
        );
    }
}
