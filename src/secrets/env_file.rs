//! `.env` file secret store for workstation runs
//!
//! Supports format:
//! ```text
//! # Tenant: Contoso
//! TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
//! CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
//! CLIENT_SECRET=your-secret-here
//! ```
//!
//! Secret names are looked up verbatim first, then as `UPPER_SNAKE`
//! (`client-secret` → `CLIENT_SECRET`).

use super::SecretStore;
use crate::error::{IntuneSyncError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct EnvFileSecretStore {
    path: PathBuf,
    vars: HashMap<String, String>,
}

impl EnvFileSecretStore {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            IntuneSyncError::SecretStoreError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            vars: parse_env_file(&contents),
        })
    }
}

#[async_trait]
impl SecretStore for EnvFileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let env_key = name.to_uppercase().replace('-', "_");
        self.vars
            .get(name)
            .or_else(|| self.vars.get(&env_key))
            .cloned()
            .ok_or_else(|| {
                IntuneSyncError::SecretStoreError(format!(
                    "'{}' not found in {}",
                    name,
                    self.path.display()
                ))
            })
    }
}

/// Parse simple .env file format
pub fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();

            // Remove surrounding quotes if present
            let value = if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                &value[1..value.len() - 1]
            } else {
                value
            };

            vars.insert(key.trim().to_string(), value.to_string());
        }
    }

    vars
}
