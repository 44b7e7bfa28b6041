use crate::config::{ConfigManager, TenantConfig, TokenCache};
use crate::error::{Exp365Error, Result};
use colored::Colorize;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields,
    Scope, TokenResponse, TokenUrl, basic::BasicClient, reqwest::async_http_client,
};
use std::time::Duration;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Application permissions the exports rely on
pub const REQUIRED_SCOPES: &[&str] = &[
    "Tasks.Read.All",
    "Group.Read.All",
    "User.Read.All",
    "AuditLog.Read.All",
    "Application.Read.All",
];

pub struct GraphAuth {
    config_manager: ConfigManager,
}

fn authority_url(tenant_id: &str, path: &str) -> String {
    format!("{}/{}/oauth2/v2.0/{}", MICROSOFT_AUTHORITY, tenant_id, path)
}

fn expiry_from(expires_in: Option<Duration>) -> chrono::DateTime<chrono::Utc> {
    let lifetime = chrono::Duration::from_std(expires_in.unwrap_or(Duration::from_secs(3600)))
        .unwrap_or_else(|_| chrono::Duration::hours(1));
    chrono::Utc::now() + lifetime
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    fn endpoints(tenant_config: &TenantConfig) -> Result<(AuthUrl, TokenUrl)> {
        let auth_url = AuthUrl::new(authority_url(&tenant_config.tenant_id, "authorize"))
            .map_err(|e| Exp365Error::AuthError(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(authority_url(&tenant_config.tenant_id, "token"))
            .map_err(|e| Exp365Error::AuthError(format!("Invalid token URL: {}", e)))?;
        Ok((auth_url, token_url))
    }

    /// Authenticate using device code flow (interactive)
    pub async fn login_device_code(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        println!(
            "{} Starting device code authentication for tenant '{}'...",
            "→".cyan(),
            tenant_config.name
        );

        let (auth_url, token_url) = Self::endpoints(tenant_config)?;
        let device_auth_url =
            DeviceAuthorizationUrl::new(authority_url(&tenant_config.tenant_id, "devicecode"))
                .map_err(|e| Exp365Error::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(tenant_config.client_id.clone()),
            None,
            auth_url,
            Some(token_url),
        )
        .set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| Exp365Error::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    Exp365Error::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        println!("\n  Visit:      {}", details.verification_uri().as_str().bold());
        println!("  Enter code: {}\n", details.user_code().secret().bold());

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| Exp365Error::AuthError(format!("Token exchange failed: {}", e)))?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: expiry_from(token.expires_in()),
            tenant_id: tenant_config.tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        tracing::debug!(
            path = ?self.config_manager.token_cache_file(&tenant_config.name),
            "Token cached"
        );
        println!("{} Authentication successful", "✓".green());

        Ok(token_cache)
    }

    /// Authenticate using client credentials flow (non-interactive)
    pub async fn login_client_credentials(
        &self,
        tenant_config: &TenantConfig,
    ) -> Result<TokenCache> {
        let client_secret = tenant_config.client_secret.as_ref().ok_or_else(|| {
            Exp365Error::AuthError("Client secret required for client credentials flow".into())
        })?;

        println!(
            "{} Authenticating with client credentials for tenant '{}'...",
            "→".cyan(),
            tenant_config.name
        );

        let (auth_url, token_url) = Self::endpoints(tenant_config)?;
        let client = BasicClient::new(
            ClientId::new(tenant_config.client_id.clone()),
            Some(ClientSecret::new(client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                Exp365Error::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: None,
            expires_at: expiry_from(token.expires_in()),
            tenant_id: tenant_config.tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        println!("{} Authentication successful", "✓".green());

        Ok(token_cache)
    }

    /// Cached access token for a tenant; an expired token means logging in again
    pub async fn get_access_token(&self, tenant_name: &str) -> Result<String> {
        match self.config_manager.load_token(tenant_name) {
            Ok(token) => Ok(token.access_token),
            Err(Exp365Error::AuthError(_)) => Err(Exp365Error::TokenNotFound),
            Err(e) => Err(e),
        }
    }

    /// Delete the token cache for a tenant
    pub fn logout(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_token(tenant_name)?;
        println!("{} Logged out from tenant '{}'", "✓".green(), tenant_name);
        Ok(())
    }
}
