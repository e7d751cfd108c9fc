use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntuneSyncError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Secret store error: {0}")]
    SecretStoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    #[error("No build ranges could be built: {0}")]
    NoBuildRanges(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, IntuneSyncError>;

pub use IntuneSyncError as Error;

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: The access token was rejected. Check the tenant and client secrets in the secret store."
                }
                "Forbidden" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
                    "\nHint: The app registration needs DeviceManagementConfiguration.ReadWrite.All, DeviceManagementManagedDevices.Read.All and Device.ReadWrite.All with admin consent."
                }
                "NotFound" | "ResourceNotFound" | "Request_ResourceNotFound" => {
                    "\nHint: Check the script, policy and profile IDs in the configuration file."
                }
                "BadRequest" if message.contains("Resource not found for the segment") => {
                    "\nHint: This endpoint is only available on the beta API."
                }
                "TooManyRequests" => "\nHint: API rate limit exceeded. Re-run later.",
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}
