use crate::error::{IntuneSyncError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GRAPH_HOST: &str = "https://graph.microsoft.com";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const DEFAULT_SENTINEL: &str = "Compliant";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,

    pub secret_store: SecretStoreConfig,

    #[serde(default)]
    pub attribute_sync: Option<AttributeSyncConfig>,

    #[serde(default)]
    pub build_ranges: Option<BuildRangesConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_host")]
    pub host: String,

    #[serde(default = "default_authority")]
    pub authority: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            host: default_graph_host(),
            authority: default_authority(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SecretStoreKind {
    #[default]
    KeyVault,
    EnvFile,
}

/// Where the tenant id, client id and client secret are read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretStoreConfig {
    #[serde(default)]
    pub kind: SecretStoreKind,

    /// e.g. https://contoso-automation.vault.azure.net
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_url: Option<String>,

    /// Client ID of a user-assigned managed identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_client_id: Option<String>,

    /// Path of the .env file when `kind = "env-file"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub names: SecretNames,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretNames {
    #[serde(default = "default_tenant_id_secret")]
    pub tenant_id: String,
    #[serde(default = "default_client_id_secret")]
    pub client_id: String,
    #[serde(default = "default_client_secret_secret")]
    pub client_secret: String,
}

impl Default for SecretNames {
    fn default() -> Self {
        Self {
            tenant_id: default_tenant_id_secret(),
            client_id: default_client_id_secret(),
            client_secret: default_client_secret_secret(),
        }
    }
}

/// Settings for the extension-attribute reconciler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSyncConfig {
    /// ID of the custom attribute shell script whose run results are read
    pub script_id: String,

    /// Result message that marks a device as compliant
    pub desired_result: String,

    #[serde(default = "default_sentinel")]
    pub sentinel_value: String,

    /// extensionAttribute slot (1-15) written on the Entra device
    #[serde(default = "default_extension_attribute")]
    pub extension_attribute: u8,

    /// Directory device operatingSystem used to list tagged devices
    #[serde(default = "default_operating_system")]
    pub operating_system: String,
}

impl AttributeSyncConfig {
    pub fn attribute_name(&self) -> String {
        format!("extensionAttribute{}", self.extension_attribute)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UpdateClassification {
    #[default]
    Security,
    NonSecurity,
    All,
}

impl UpdateClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateClassification::Security => "security",
            UpdateClassification::NonSecurity => "nonSecurity",
            UpdateClassification::All => "all",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpdateClassification::Security => "Security",
            UpdateClassification::NonSecurity => "Non-security",
            UpdateClassification::All => "",
        }
    }

    /// Whether a catalog entry classification is selected by this setting
    pub fn matches(&self, classification: Option<&str>) -> bool {
        match self {
            UpdateClassification::All => true,
            _ => classification
                .map(|c| c.eq_ignore_ascii_case(self.as_str()))
                .unwrap_or(false),
        }
    }
}

/// One build-number prefix tracked on the compliance policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSpec {
    /// e.g. "10.0.22631"
    pub prefix: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BuildSpec {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.prefix)
    }
}

/// Settings for the compliance build-range builder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRangesConfig {
    /// Windows 10/11 compliance policy that owns the build ranges
    pub policy_id: String,

    #[serde(default)]
    pub classification: UpdateClassification,

    /// Number of most recent catalog entries considered
    #[serde(default = "default_catalog_entry_count")]
    pub catalog_entry_count: usize,

    /// Emit `<prefix>.9999` as the high bound instead of the latest build
    #[serde(default)]
    pub allow_newer_builds: bool,

    pub builds: Vec<BuildSpec>,

    #[serde(default)]
    pub expedite: ExpediteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExpediteConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Windows quality update profile ID
    #[serde(default)]
    pub policy_id: String,

    #[serde(default = "default_days_until_forced_reboot")]
    pub days_until_forced_reboot: u8,
}

fn default_graph_host() -> String {
    DEFAULT_GRAPH_HOST.to_string()
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_tenant_id_secret() -> String {
    "tenant-id".to_string()
}

fn default_client_id_secret() -> String {
    "client-id".to_string()
}

fn default_client_secret_secret() -> String {
    "client-secret".to_string()
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}

fn default_extension_attribute() -> u8 {
    1
}

fn default_operating_system() -> String {
    "MacMDM".to_string()
}

fn default_catalog_entry_count() -> usize {
    3
}

fn default_days_until_forced_reboot() -> u8 {
    2
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(IntuneSyncError::InvalidConfig(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_url(value: &str, field: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| IntuneSyncError::InvalidConfig(format!("{} is not a valid URL: {}", field, e)))?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(IntuneSyncError::InvalidConfig(format!(
            "{} must be an http(s) URL",
            field
        )));
    }
    Ok(())
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        require_url(&self.graph.host, "graph.host")?;
        require_url(&self.graph.authority, "graph.authority")?;
        if self.graph.timeout_secs == 0 {
            return Err(IntuneSyncError::InvalidConfig(
                "graph.timeout_secs must be greater than zero".into(),
            ));
        }

        let store = &self.secret_store;
        match store.kind {
            SecretStoreKind::KeyVault => {
                let vault_url = store.vault_url.as_deref().ok_or_else(|| {
                    IntuneSyncError::InvalidConfig(
                        "secret_store.vault_url is required for the key-vault store".into(),
                    )
                })?;
                require_url(vault_url, "secret_store.vault_url")?;
            }
            SecretStoreKind::EnvFile => {
                if store.path.is_none() {
                    return Err(IntuneSyncError::InvalidConfig(
                        "secret_store.path is required for the env-file store".into(),
                    ));
                }
            }
        }
        require(&store.names.tenant_id, "secret_store.names.tenant_id")?;
        require(&store.names.client_id, "secret_store.names.client_id")?;
        require(&store.names.client_secret, "secret_store.names.client_secret")?;

        if let Some(attr) = &self.attribute_sync {
            require(&attr.script_id, "attribute_sync.script_id")?;
            require(&attr.desired_result, "attribute_sync.desired_result")?;
            require(&attr.sentinel_value, "attribute_sync.sentinel_value")?;
            require(&attr.operating_system, "attribute_sync.operating_system")?;
            if !(1..=15).contains(&attr.extension_attribute) {
                return Err(IntuneSyncError::InvalidConfig(format!(
                    "attribute_sync.extension_attribute must be between 1 and 15, got {}",
                    attr.extension_attribute
                )));
            }
        }

        if let Some(ranges) = &self.build_ranges {
            require(&ranges.policy_id, "build_ranges.policy_id")?;
            if ranges.catalog_entry_count == 0 {
                return Err(IntuneSyncError::InvalidConfig(
                    "build_ranges.catalog_entry_count must be at least 1".into(),
                ));
            }
            if ranges.builds.is_empty() {
                return Err(IntuneSyncError::InvalidConfig(
                    "build_ranges.builds must list at least one build prefix".into(),
                ));
            }

            let mut seen = HashSet::new();
            for build in &ranges.builds {
                if !is_build_prefix(&build.prefix) {
                    return Err(IntuneSyncError::InvalidConfig(format!(
                        "'{}' is not a build prefix (expected dotted numbers such as 10.0.22631)",
                        build.prefix
                    )));
                }
                if !seen.insert(build.prefix.as_str()) {
                    return Err(IntuneSyncError::InvalidConfig(format!(
                        "build prefix '{}' is listed twice",
                        build.prefix
                    )));
                }
            }

            if ranges.expedite.enabled {
                require(&ranges.expedite.policy_id, "build_ranges.expedite.policy_id")?;
                if ranges.expedite.days_until_forced_reboot > 2 {
                    return Err(IntuneSyncError::InvalidConfig(
                        "build_ranges.expedite.days_until_forced_reboot must be 0, 1 or 2".into(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn attribute_sync(&self) -> Result<&AttributeSyncConfig> {
        self.attribute_sync.as_ref().ok_or_else(|| {
            IntuneSyncError::ConfigError("[attribute_sync] section missing from configuration".into())
        })
    }

    pub fn build_ranges(&self) -> Result<&BuildRangesConfig> {
        self.build_ranges.as_ref().ok_or_else(|| {
            IntuneSyncError::ConfigError("[build_ranges] section missing from configuration".into())
        })
    }
}

fn is_build_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Locates and loads the configuration file
#[derive(Clone)]
pub struct ConfigManager {
    config_file: PathBuf,
}

impl ConfigManager {
    /// Use `path` when given, otherwise the per-user config directory
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let config_file = match path {
            Some(p) => p,
            None => {
                let project_dirs = ProjectDirs::from("com", "intune-sync", "intune-sync")
                    .ok_or_else(|| {
                        IntuneSyncError::ConfigError("Failed to determine config directory".into())
                    })?;
                project_dirs.config_dir().join("intune-sync.toml")
            }
        };

        Ok(Self { config_file })
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn load(&self) -> Result<Config> {
        if !self.config_file.exists() {
            return Err(IntuneSyncError::ConfigError(format!(
                "Config file not found: {}. Run 'intune-sync config init' to create one",
                self.config_file.display()
            )));
        }

        let contents = fs::read_to_string(&self.config_file)?;
        Config::from_toml_str(&contents)
    }

    /// Write the commented template, refusing to overwrite unless `force`
    pub fn init(&self, force: bool) -> Result<()> {
        if self.config_file.exists() && !force {
            return Err(IntuneSyncError::ConfigError(format!(
                "{} already exists (use --force to overwrite)",
                self.config_file.display()
            )));
        }

        if let Some(parent) = self.config_file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&self.config_file, CONFIG_TEMPLATE)?;
        Ok(())
    }
}

pub const CONFIG_TEMPLATE: &str = r#"# intune-sync configuration

[graph]
host = "https://graph.microsoft.com"
authority = "https://login.microsoftonline.com"
timeout_secs = 60

[secret_store]
# "key-vault" signs in with the managed identity, "env-file" reads a local .env file
kind = "key-vault"
vault_url = "https://contoso-automation.vault.azure.net"
# identity_client_id = "<user-assigned identity client id>"
# path = "/etc/intune-sync/tenant.env"

[secret_store.names]
tenant_id = "tenant-id"
client_id = "client-id"
client_secret = "client-secret"

[attribute_sync]
script_id = "00000000-0000-0000-0000-000000000000"
desired_result = "Compliant"
sentinel_value = "Compliant"
extension_attribute = 1
operating_system = "MacMDM"

[build_ranges]
policy_id = "00000000-0000-0000-0000-000000000000"
classification = "security"
catalog_entry_count = 3
allow_newer_builds = false
builds = [
    { prefix = "10.0.19045", description = "Windows 10 22H2" },
    { prefix = "10.0.22631", description = "Windows 11 23H2" },
    { prefix = "10.0.26100", description = "Windows 11 24H2" },
]

[build_ranges.expedite]
enabled = false
policy_id = "00000000-0000-0000-0000-000000000000"
days_until_forced_reboot = 2
"#;
