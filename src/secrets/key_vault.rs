//! Azure Key Vault secret store authenticated with a managed identity

use super::SecretStore;
use crate::error::{IntuneSyncError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

pub const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";
const KEY_VAULT_API_VERSION: &str = "7.4";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Where the managed identity token is requested from
#[derive(Debug, Clone)]
pub enum IdentityEndpoint {
    /// App Service, Functions and Automation (`IDENTITY_ENDPOINT` + `IDENTITY_HEADER`)
    AppService { endpoint: String, header: String },
    /// Azure Instance Metadata Service (VMs, scale sets)
    Imds { endpoint: String },
}

#[derive(Debug, Deserialize)]
struct IdentityTokenResponse {
    access_token: String,
}

pub struct ManagedIdentityCredential {
    client: Client,
    endpoint: IdentityEndpoint,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn new(endpoint: IdentityEndpoint, client_id: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            client_id,
        }
    }

    /// Pick the hosting environment's endpoint, falling back to IMDS
    pub fn from_env(client_id: Option<String>) -> Self {
        let endpoint = match (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            (Ok(endpoint), Ok(header)) => IdentityEndpoint::AppService { endpoint, header },
            _ => IdentityEndpoint::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };

        Self::new(endpoint, client_id)
    }

    /// Sign in as the managed identity and return a token for `resource`
    pub async fn get_token(&self, resource: &str) -> Result<String> {
        let mut query: Vec<(&str, &str)> = vec![("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id));
        }

        let request = match &self.endpoint {
            IdentityEndpoint::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
            }
            IdentityEndpoint::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.client
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        tracing::debug!("Requesting managed identity token for {}", resource);

        let response = request.send().await.map_err(|e| {
            IntuneSyncError::AuthError(format!("Managed identity endpoint unreachable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntuneSyncError::AuthError(format!(
                "Managed identity sign-in failed (HTTP {}): {}",
                status,
                crate::error::enhance_graph_error(&body)
            )));
        }

        let token: IdentityTokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

pub struct KeyVaultSecretStore {
    client: Client,
    vault_url: String,
    credential: ManagedIdentityCredential,
    token: OnceCell<String>,
}

impl KeyVaultSecretStore {
    pub fn new(vault_url: &str, credential: ManagedIdentityCredential) -> Self {
        Self {
            client: Client::new(),
            vault_url: vault_url.trim_end_matches('/').to_string(),
            credential,
            token: OnceCell::new(),
        }
    }

    async fn vault_token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| self.credential.get_token(KEY_VAULT_RESOURCE))
            .await?;
        Ok(token.as_str())
    }
}

#[async_trait]
impl SecretStore for KeyVaultSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let token = self.vault_token().await?;
        let url = format!("{}/secrets/{}", self.vault_url, name);

        let response = self
            .client
            .get(&url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntuneSyncError::SecretStoreError(format!(
                "Reading secret '{}' failed (HTTP {}): {}",
                name,
                status,
                crate::error::enhance_graph_error(&body)
            )));
        }

        let bundle: SecretBundle = response.json().await?;
        Ok(bundle.value)
    }
}
