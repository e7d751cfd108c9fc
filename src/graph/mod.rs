pub mod auth;
pub mod intune;
pub mod windows_updates;

use crate::config::GraphConfig;
use crate::error::{IntuneSyncError, Result};
use crate::secrets::TenantCredentials;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const API_V1: &str = "v1.0";
pub const API_BETA: &str = "beta";

/// Graph API client
///
/// Every call is a single attempt: a failed request surfaces to the caller,
/// which decides whether it is fatal for the run.
pub struct GraphClient {
    client: Client,
    access_token: String,
    host: String,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_host(access_token, crate::config::DEFAULT_GRAPH_HOST, None)
    }

    /// Point the client at another Graph host (national clouds, mock servers)
    pub fn with_host(access_token: String, host: &str, timeout: Option<Duration>) -> Self {
        let client = match timeout {
            Some(timeout) => Self::http_client(timeout).unwrap_or_else(|e| {
                tracing::warn!(
                    "Could not apply {}s request timeout, using client defaults: {}",
                    timeout.as_secs(),
                    e
                );
                Client::new()
            }),
            None => Client::new(),
        };

        Self::from_parts(client, access_token, host)
    }

    fn http_client(timeout: Duration) -> Result<Client> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    fn from_parts(client: Client, access_token: String, host: &str) -> Self {
        Self {
            client,
            access_token,
            host: host.trim_end_matches('/').to_string(),
        }
    }

    /// Acquire a token for `credentials` and build a client for the configured host
    pub async fn authenticate(
        graph: &GraphConfig,
        credentials: &TenantCredentials,
        tokens: &dyn auth::TokenProvider,
    ) -> Result<Self> {
        let client = Self::http_client(Duration::from_secs(graph.timeout_secs))?;
        let access_token = tokens.access_token(credentials).await?;
        Ok(Self::from_parts(client, access_token, &graph.host))
    }

    fn url(&self, version: &str, endpoint: &str) -> String {
        format!(
            "{}/{}/{}",
            self.host,
            version,
            endpoint.trim_start_matches('/')
        )
    }

    /// Make a GET request to Graph API
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        self.get_url(&self.url(API_V1, endpoint)).await
    }

    /// Make a GET request to Graph API (beta endpoint)
    pub async fn get_beta<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        self.get_url(&self.url(API_BETA, endpoint)).await
    }

    /// Make a PATCH request to Graph API
    pub async fn patch<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        self.patch_url(&self.url(API_V1, endpoint), body).await
    }

    /// Make a PATCH request to Graph API (beta endpoint)
    pub async fn patch_beta<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        self.patch_url(&self.url(API_BETA, endpoint), body).await
    }

    async fn get_url<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let resp = self.send(self.request(Method::GET, url)).await?;
        let data = resp.json::<T>().await?;
        Ok(data)
    }

    /// PATCH responses are usually 204 No Content, so the body is ignored
    async fn patch_url<T: Serialize>(&self, url: &str, body: &T) -> Result<()> {
        self.send(self.request(Method::PATCH, url).json(body))
            .await?;
        Ok(())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        tracing::debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let resp = request.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            let enhanced_error = crate::error::enhance_graph_error(&error_text);
            return Err(IntuneSyncError::GraphApiError(format!(
                "HTTP {}: {}",
                status, enhanced_error
            )));
        }

        Ok(resp)
    }
}

// ============================================================================
// Pagination Helpers
// ============================================================================

/// Generic paginated response from Graph API
///
/// Use this for standard OData paginated responses with `value` array and `@odata.nextLink`
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl GraphClient {
    /// Fetch all pages of a paginated Graph API endpoint
    ///
    /// Follows `@odata.nextLink` until all pages are retrieved.
    pub async fn get_all_pages<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>> {
        self.get_all_pages_from(self.url(API_V1, endpoint)).await
    }

    /// Fetch all pages from a beta endpoint
    pub async fn get_all_pages_beta<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>> {
        self.get_all_pages_from(self.url(API_BETA, endpoint)).await
    }

    async fn get_all_pages_from<T: for<'de> Deserialize<'de>>(
        &self,
        first_url: String,
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = first_url;

        loop {
            let response: PaginatedResponse<T> = self.get_url(&current_url).await?;
            all_items.extend(response.value);

            match response.next_link {
                Some(next) => current_url = next,
                None => break,
            }
        }

        Ok(all_items)
    }
}

/// Quote a value for use inside an OData `$filter` string literal
pub fn odata_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
