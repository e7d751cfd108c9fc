//! Extension-attribute desired state
//!
//! A device carries the sentinel value iff its latest script result equals
//! the desired result. The plan is the symmetric difference between the
//! devices that should carry it and the devices that currently do.

use std::collections::BTreeMap;

/// Entra ID returns this for devices that never registered
pub const PLACEHOLDER_OBJECT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// A directory device the reconciler may write to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    /// Directory object id, the key for PATCH devices/{id}
    pub object_id: String,
    pub name: String,
}

impl DeviceTarget {
    pub fn new(object_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            name: name.into(),
        }
    }

    fn key(&self) -> String {
        self.object_id.trim().to_ascii_lowercase()
    }
}

/// Whether an id can be written to (not missing, blank or the all-zero GUID)
pub fn is_valid_object_id(id: Option<&str>) -> bool {
    match id.map(str::trim) {
        Some(id) => !id.is_empty() && id != PLACEHOLDER_OBJECT_ID,
        None => false,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AttributePlan {
    pub to_set: Vec<DeviceTarget>,
    pub to_clear: Vec<DeviceTarget>,
}

impl AttributePlan {
    pub fn is_empty(&self) -> bool {
        self.to_set.is_empty() && self.to_clear.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_set.len() + self.to_clear.len()
    }
}

fn index(devices: &[DeviceTarget]) -> BTreeMap<String, &DeviceTarget> {
    devices.iter().map(|d| (d.key(), d)).collect()
}

/// Compute the writes that converge `tagged` onto `desired`
///
/// Placeholder ids are dropped from `desired`. Both lists come back sorted
/// by object id, without duplicates.
pub fn plan_attribute_changes(desired: &[DeviceTarget], tagged: &[DeviceTarget]) -> AttributePlan {
    let desired: BTreeMap<String, &DeviceTarget> = index(desired)
        .into_iter()
        .filter(|(_, d)| is_valid_object_id(Some(&d.object_id)))
        .collect();
    let tagged = index(tagged);

    let to_set = desired
        .iter()
        .filter(|(key, _)| !tagged.contains_key(*key))
        .map(|(_, d)| (*d).clone())
        .collect();

    let to_clear = tagged
        .iter()
        .filter(|(key, _)| !desired.contains_key(*key))
        .map(|(_, d)| (*d).clone())
        .collect();

    AttributePlan { to_set, to_clear }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(ids: &[&str]) -> Vec<DeviceTarget> {
        ids.iter().map(|id| DeviceTarget::new(*id, format!("mac-{}", id))).collect()
    }

    fn ids(devices: &[DeviceTarget]) -> Vec<&str> {
        devices.iter().map(|d| d.object_id.as_str()).collect()
    }

    #[test]
    fn test_symmetric_difference() {
        let plan = plan_attribute_changes(&devices(&["b", "a", "c"]), &devices(&["c", "d"]));
        assert_eq!(ids(&plan.to_set), vec!["a", "b"]);
        assert_eq!(ids(&plan.to_clear), vec!["d"]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_converged_state_plans_nothing() {
        let plan = plan_attribute_changes(&devices(&["a", "b"]), &devices(&["b", "a"]));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_placeholder_ids_are_excluded() {
        let plan = plan_attribute_changes(
            &devices(&[PLACEHOLDER_OBJECT_ID, "", "a"]),
            &devices(&[]),
        );
        assert_eq!(ids(&plan.to_set), vec!["a"]);
    }

    #[test]
    fn test_placeholder_tagged_device_is_cleared() {
        let plan = plan_attribute_changes(&devices(&[PLACEHOLDER_OBJECT_ID]), &devices(&["a"]));
        assert!(plan.to_set.is_empty());
        assert_eq!(ids(&plan.to_clear), vec!["a"]);
    }

    #[test]
    fn test_duplicates_and_case_collapse() {
        let desired = vec![
            DeviceTarget::new("ABC", "one"),
            DeviceTarget::new("abc", "one-again"),
        ];
        let plan = plan_attribute_changes(&desired, &[]);
        assert_eq!(plan.to_set.len(), 1);

        let plan = plan_attribute_changes(&desired, &[DeviceTarget::new("abc", "one")]);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_empty_desired_clears_everything() {
        let plan = plan_attribute_changes(&[], &devices(&["x", "y"]));
        assert_eq!(ids(&plan.to_clear), vec!["x", "y"]);
        assert!(plan.to_set.is_empty());
    }

    #[test]
    fn test_is_valid_object_id() {
        assert!(is_valid_object_id(Some("8c1e2f4a-0000-4000-8000-000000000001")));
        assert!(!is_valid_object_id(Some(PLACEHOLDER_OBJECT_ID)));
        assert!(!is_valid_object_id(Some("  ")));
        assert!(!is_valid_object_id(None));
    }
}
