//! Intune and directory Graph API operations
//!
//! Typed wrappers around the handful of endpoints the pipelines read and write.

use crate::error::Result;
use crate::graph::{odata_quote, GraphClient, PaginatedResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

pub const VERSION_RANGE_ODATA_TYPE: &str = "#microsoft.graph.operatingSystemVersionRange";
const DEVICE_SELECT: &str = "id,deviceId,displayName,operatingSystem,extensionAttributes";

// ============================================================================
// Custom attribute scripts and devices
// ============================================================================

/// Latest run of a custom attribute script on one device
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRunState {
    pub id: String,
    #[serde(default)]
    pub result_message: Option<String>,
    #[serde(default)]
    pub last_state_update_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub managed_device: Option<ManagedDevice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDevice {
    pub id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Entra ID `deviceId` (not the directory object id)
    #[serde(default, rename = "azureADDeviceId")]
    pub azure_ad_device_id: Option<String>,
}

/// Entra ID device object
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryDevice {
    /// Directory object id
    pub id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub extension_attributes: HashMap<String, Option<String>>,
}

impl DirectoryDevice {
    /// Value of `extensionAttribute{slot}`, if set
    pub fn extension_attribute(&self, slot: u8) -> Option<&str> {
        self.extension_attributes
            .get(&format!("extensionAttribute{}", slot))
            .and_then(|v| v.as_deref())
    }
}

/// Device run states of a custom attribute script whose result equals `result_message`
pub async fn list_script_run_states(
    client: &GraphClient,
    script_id: &str,
    result_message: &str,
) -> Result<Vec<ScriptRunState>> {
    let endpoint = format!(
        "deviceManagement/deviceCustomAttributeShellScripts/{}/deviceRunStates?$filter=resultMessage eq {}&$expand=managedDevice",
        script_id,
        odata_quote(result_message)
    );
    client.get_all_pages_beta(&endpoint).await
}

/// Look up the directory device for an Entra `deviceId`
pub async fn find_directory_device(
    client: &GraphClient,
    device_id: &str,
) -> Result<Option<DirectoryDevice>> {
    let endpoint = format!(
        "devices?$filter=deviceId eq {}&$select={}",
        odata_quote(device_id),
        DEVICE_SELECT
    );
    let response: PaginatedResponse<DirectoryDevice> = client.get(&endpoint).await?;
    Ok(response.value.into_iter().next())
}

/// All directory devices of one operating system, with extension attributes
pub async fn list_directory_devices(
    client: &GraphClient,
    operating_system: &str,
) -> Result<Vec<DirectoryDevice>> {
    let endpoint = format!(
        "devices?$filter=operatingSystem eq {}&$select={}",
        odata_quote(operating_system),
        DEVICE_SELECT
    );
    client.get_all_pages(&endpoint).await
}

/// Set (`Some`) or clear (`None`) one extension attribute on a directory device
pub async fn set_extension_attribute(
    client: &GraphClient,
    object_id: &str,
    slot: u8,
    value: Option<&str>,
) -> Result<()> {
    let body = extension_attribute_body(slot, value);
    client.patch(&format!("devices/{}", object_id), &body).await
}

fn extension_attribute_body(slot: u8, value: Option<&str>) -> serde_json::Value {
    let mut attributes = serde_json::Map::new();
    attributes.insert(format!("extensionAttribute{}", slot), json!(value));
    json!({ "extensionAttributes": attributes })
}

// ============================================================================
// Compliance policies
// ============================================================================

/// One entry of `validOperatingSystemBuildRanges`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperatingSystemVersionRange {
    #[serde(rename = "@odata.type", default = "default_range_odata_type")]
    pub odata_type: String,
    #[serde(default)]
    pub description: Option<String>,
    pub lowest_version: String,
    pub highest_version: String,
}

fn default_range_odata_type() -> String {
    VERSION_RANGE_ODATA_TYPE.to_string()
}

impl OperatingSystemVersionRange {
    pub fn new(description: &str, lowest_version: &str, highest_version: &str) -> Self {
        Self {
            odata_type: default_range_odata_type(),
            description: Some(description.to_string()),
            lowest_version: lowest_version.to_string(),
            highest_version: highest_version.to_string(),
        }
    }

    /// Same bounds and description; the odata annotation is not always echoed back
    pub fn same_range(&self, other: &Self) -> bool {
        self.lowest_version == other.lowest_version
            && self.highest_version == other.highest_version
            && self.description.as_deref().unwrap_or("") == other.description.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompliancePolicy {
    pub id: String,
    #[serde(rename = "@odata.type", default)]
    pub odata_type: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub valid_operating_system_build_ranges: Vec<OperatingSystemVersionRange>,
}

impl CompliancePolicy {
    /// Whether the policy already carries exactly `ranges`, in order
    pub fn has_build_ranges(&self, ranges: &[OperatingSystemVersionRange]) -> bool {
        self.valid_operating_system_build_ranges.len() == ranges.len()
            && self
                .valid_operating_system_build_ranges
                .iter()
                .zip(ranges)
                .all(|(current, wanted)| current.same_range(wanted))
    }
}

/// Get a specific compliance policy by ID
pub async fn get_compliance_policy(client: &GraphClient, policy_id: &str) -> Result<CompliancePolicy> {
    client
        .get(&format!(
            "deviceManagement/deviceCompliancePolicies/{}",
            policy_id
        ))
        .await
}

/// Replace the policy's valid build ranges
pub async fn update_compliance_build_ranges(
    client: &GraphClient,
    policy: &CompliancePolicy,
    ranges: &[OperatingSystemVersionRange],
) -> Result<()> {
    let body = json!({
        "@odata.type": policy
            .odata_type
            .as_deref()
            .unwrap_or("#microsoft.graph.windows10CompliancePolicy"),
        "validOperatingSystemBuildRanges": ranges,
    });

    client
        .patch(
            &format!("deviceManagement/deviceCompliancePolicies/{}", policy.id),
            &body,
        )
        .await
}

// ============================================================================
// Windows quality update profiles
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExpeditedUpdateSettings {
    pub quality_update_release: Option<DateTime<Utc>>,
    pub days_until_forced_reboot: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityUpdateProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub release_date_display_name: Option<String>,
    #[serde(default)]
    pub expedited_update_settings: Option<ExpeditedUpdateSettings>,
}

pub async fn get_quality_update_profile(
    client: &GraphClient,
    profile_id: &str,
) -> Result<QualityUpdateProfile> {
    client
        .get_beta(&format!(
            "deviceManagement/windowsQualityUpdateProfiles/{}",
            profile_id
        ))
        .await
}

pub async fn update_expedite_settings(
    client: &GraphClient,
    profile_id: &str,
    settings: &ExpeditedUpdateSettings,
    release_label: &str,
) -> Result<()> {
    let body = json!({
        "releaseDateDisplayName": release_label,
        "expeditedUpdateSettings": settings,
    });

    client
        .patch_beta(
            &format!("deviceManagement/windowsQualityUpdateProfiles/{}", profile_id),
            &body,
        )
        .await
}
