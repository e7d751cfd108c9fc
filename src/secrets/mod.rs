//! Secret retrieval for the tenant app registration
//!
//! The pipelines never see where credentials come from: they receive a
//! [`SecretStore`] and read the tenant id, client id and client secret
//! through it.

pub mod env_file;
pub mod key_vault;

use crate::config::{SecretNames, SecretStoreConfig, SecretStoreKind};
use crate::error::{IntuneSyncError, Result};
use async_trait::async_trait;
use std::fmt;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current value of a named secret
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// App registration credentials used for the client-credential exchange
#[derive(Clone)]
pub struct TenantCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Read all three credentials, failing on the first missing or empty one
pub async fn load_credentials(
    store: &dyn SecretStore,
    names: &SecretNames,
) -> Result<TenantCredentials> {
    let tenant_id = read_required(store, &names.tenant_id).await?;
    let client_id = read_required(store, &names.client_id).await?;
    let client_secret = read_required(store, &names.client_secret).await?;

    Ok(TenantCredentials {
        tenant_id,
        client_id,
        client_secret,
    })
}

async fn read_required(store: &dyn SecretStore, name: &str) -> Result<String> {
    let value = store.get_secret(name).await?;
    let value = value.trim();
    if value.is_empty() {
        return Err(IntuneSyncError::SecretStoreError(format!(
            "Secret '{}' is empty",
            name
        )));
    }
    tracing::debug!("Loaded secret '{}'", name);
    Ok(value.to_string())
}

/// Build the store selected in the configuration
pub fn from_config(config: &SecretStoreConfig) -> Result<Box<dyn SecretStore>> {
    match config.kind {
        SecretStoreKind::KeyVault => {
            let vault_url = config.vault_url.as_deref().ok_or_else(|| {
                IntuneSyncError::InvalidConfig("secret_store.vault_url is required".into())
            })?;
            let credential =
                key_vault::ManagedIdentityCredential::from_env(config.identity_client_id.clone());
            Ok(Box::new(key_vault::KeyVaultSecretStore::new(
                vault_url, credential,
            )))
        }
        SecretStoreKind::EnvFile => {
            let path = config.path.as_ref().ok_or_else(|| {
                IntuneSyncError::InvalidConfig("secret_store.path is required".into())
            })?;
            Ok(Box::new(env_file::EnvFileSecretStore::load(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticStore(HashMap<String, String>);

    #[async_trait]
    impl SecretStore for StaticStore {
        async fn get_secret(&self, name: &str) -> Result<String> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| IntuneSyncError::SecretStoreError(format!("missing {}", name)))
        }
    }

    fn store(pairs: &[(&str, &str)]) -> StaticStore {
        StaticStore(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_load_credentials() {
        let store = store(&[
            ("tenant-id", "tid"),
            ("client-id", "cid"),
            ("client-secret", " secret\n"),
        ]);
        let creds = load_credentials(&store, &SecretNames::default()).await.unwrap();
        assert_eq!(creds.tenant_id, "tid");
        assert_eq!(creds.client_id, "cid");
        assert_eq!(creds.client_secret, "secret");
    }

    #[tokio::test]
    async fn test_load_credentials_rejects_empty_secret() {
        let store = store(&[("tenant-id", "tid"), ("client-id", ""), ("client-secret", "s")]);
        let err = load_credentials(&store, &SecretNames::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("client-id"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = TenantCredentials {
            tenant_id: "tid".into(),
            client_id: "cid".into(),
            client_secret: "hunter2".into(),
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
