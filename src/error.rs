use thiserror::Error;

#[derive(Error, Debug)]
pub enum Exp365Error {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    /// The Graph API answered 404 for the requested resource
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Spreadsheet error: {0}")]
    XlsxError(#[from] rust_xlsxwriter::XlsxError),

    #[error("Token not found. Please run 'exp365 login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Exp365Error>;

pub use Exp365Error as Error;

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
                    "\nHint: Your access token may have expired. Run 'exp365 login' again."
                }
                "Forbidden" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
                    "\nHint: Check that the app registration has Tasks.Read.All, AuditLog.Read.All, \
                     User.Read.All and Application.Read.All with admin consent."
                }
                "Authentication_RequestFromNonPremiumTenantOrB2CTenant" => {
                    "\nHint: Sign-in logs require an Entra ID P1 or P2 license."
                }
                "Request_ResourceNotFound" | "NotFound" => {
                    "\nHint: The requested resource doesn't exist. Check the plan, group or object ID."
                }
                "TooManyRequests" => {
                    "\nHint: API rate limit exceeded. Increase --delay-ms and try again."
                }
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}
