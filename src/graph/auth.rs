use crate::config::GraphConfig;
use crate::error::{IntuneSyncError, Result};
use crate::secrets::TenantCredentials;
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthType, AuthUrl, ClientId, ClientSecret,
    Scope, TokenResponse, TokenUrl,
};

/// Microsoft Graph API permissions the app registration needs
pub const REQUIRED_SCOPES: &[&str] = &[
    "DeviceManagementConfiguration.ReadWrite.All",
    "DeviceManagementManagedDevices.Read.All",
    "Device.ReadWrite.All",
    "WindowsUpdates.ReadWrite.All",
];

/// Exchanges tenant credentials for a Graph access token
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, credentials: &TenantCredentials) -> Result<String>;
}

/// OAuth2 client credentials flow against the Entra ID v2.0 endpoint
pub struct ClientCredentialsAuth {
    authority: String,
    scope: String,
}

impl ClientCredentialsAuth {
    pub fn new(graph: &GraphConfig) -> Self {
        Self {
            authority: graph.authority.trim_end_matches('/').to_string(),
            scope: format!("{}/.default", graph.host.trim_end_matches('/')),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsAuth {
    async fn access_token(&self, credentials: &TenantCredentials) -> Result<String> {
        let tenant_id = &credentials.tenant_id;

        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority, tenant_id
        ))
        .map_err(|e| IntuneSyncError::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority, tenant_id
        ))
        .map_err(|e| IntuneSyncError::AuthError(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        tracing::debug!("Requesting client credentials token for tenant {}", tenant_id);

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(self.scope.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                IntuneSyncError::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        Ok(token.access_token().secret().clone())
    }
}
