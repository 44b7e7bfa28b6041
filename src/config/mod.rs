use crate::error::{Exp365Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure (`config.toml`)
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub export: ExportDefaults,
}

/// Defaults for export commands, overridable per invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    pub output_dir: PathBuf,
    /// Fixed pause before every Graph request, in milliseconds
    pub request_delay_ms: u64,
    pub lookback_days: u32,
    /// Extra attempts on 429/5xx/connection errors. 0 disables retries.
    pub max_retries: u32,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./export"),
            request_delay_ms: 0,
            lookback_days: 7,
            max_retries: 0,
        }
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    DeviceCode,
    ClientCredentials,
}

/// Token cache structure
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
}

/// Configuration manager
#[derive(Clone, Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "exp365", "exp365").ok_or_else(|| {
            Exp365Error::ConfigError("Failed to determine config directory".into())
        })?;

        Self::with_dir(project_dirs.config_dir())
    }

    /// Use an explicit configuration directory, creating it if needed
    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = dir.as_ref().to_path_buf();
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }
        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    pub fn token_cache_file(&self, tenant_name: &str) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.token", tenant_name))
    }

    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| Exp365Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;

        #[derive(Deserialize)]
        struct TenantsFile {
            #[serde(default)]
            tenants: Vec<TenantConfig>,
        }

        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let contents = toml::to_string_pretty(&TenantsFile { tenants })
            .map_err(|e| Exp365Error::ConfigError(format!("Failed to serialize tenants: {}", e)))?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or replace a tenant with the same name
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| t.name != tenant.name);
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Exp365Error::TenantNotFound(name.to_string()))
    }

    pub fn get_active_tenant(&self) -> Result<Option<TenantConfig>> {
        match self.load_config()?.current_tenant {
            Some(tenant_name) => Ok(Some(self.get_tenant(&tenant_name)?)),
            None => Ok(None),
        }
    }

    /// Resolve an explicit `--tenant` override, falling back to the active tenant
    pub fn resolve_tenant(&self, name: Option<&str>) -> Result<TenantConfig> {
        match name {
            Some(name) => self.get_tenant(name),
            None => self.get_active_tenant()?.ok_or_else(|| {
                Exp365Error::ConfigError(
                    "No active tenant. Run 'exp365 login <name>' or 'exp365 tenant switch <name>' first."
                        .into(),
                )
            }),
        }
    }

    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<()> {
        let tenant = self.get_tenant(tenant_name)?;
        let mut config = self.load_config()?;
        config.current_tenant = Some(tenant.name);
        self.save_config(&config)
    }

    /// Remove a tenant, its token cache and the active marker if it pointed at it
    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let (removed, tenants): (Vec<TenantConfig>, Vec<TenantConfig>) = self
            .load_tenants()?
            .into_iter()
            .partition(|t| t.name.eq_ignore_ascii_case(tenant_name));

        if removed.is_empty() {
            return Err(Exp365Error::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;
        // token files are keyed by the stored name, not the casing typed on the command line
        for tenant in &removed {
            if let Err(e) = self.delete_token(&tenant.name) {
                tracing::warn!(tenant = %tenant.name, "Failed to delete cached token: {}", e);
            }
        }

        let mut config = self.load_config()?;
        if config
            .current_tenant
            .as_deref()
            .is_some_and(|current| current.eq_ignore_ascii_case(tenant_name))
        {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    pub fn save_token(&self, tenant_name: &str, token: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name), contents)?;
        Ok(())
    }

    /// Load a cached token; expired tokens are reported as `AuthError`
    pub fn load_token(&self, tenant_name: &str) -> Result<TokenCache> {
        let token_path = self.token_cache_file(tenant_name);

        if !token_path.exists() {
            return Err(Exp365Error::TokenNotFound);
        }

        let contents = fs::read_to_string(token_path)?;
        let token: TokenCache = serde_json::from_str(&contents)?;

        if token.expires_at < chrono::Utc::now() {
            return Err(Exp365Error::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    pub fn delete_token(&self, tenant_name: &str) -> Result<()> {
        let token_path = self.token_cache_file(tenant_name);
        if token_path.exists() {
            fs::remove_file(token_path)?;
        }
        Ok(())
    }

    /// Load a tenant from `{name}.env` (or `.env`) in the config directory
    ///
    /// ```text
    /// TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_SECRET=your-secret-here
    /// ```
    pub fn load_env_file(&self, name: &str) -> Result<Option<TenantConfig>> {
        let env_path = self.config_dir.join(format!("{}.env", name.to_lowercase()));
        let fallback_path = self.config_dir.join(".env");

        let path = if env_path.exists() {
            env_path
        } else if fallback_path.exists() {
            fallback_path
        } else {
            return Ok(None);
        };

        let vars = parse_env_file(&fs::read_to_string(&path)?);

        let (Some(tenant_id), Some(client_id)) = (vars.get("TENANT_ID"), vars.get("CLIENT_ID"))
        else {
            return Ok(None);
        };
        let client_secret = vars.get("CLIENT_SECRET").cloned();

        Ok(Some(TenantConfig {
            name: name.to_string(),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            auth_type: if client_secret.is_some() {
                AuthType::ClientCredentials
            } else {
                AuthType::DeviceCode
            },
            client_secret,
            description: vars.get("DESCRIPTION").cloned(),
        }))
    }

    /// Get tenant by name from tenants.toml, importing from an env file if missing
    pub fn get_tenant_or_env(&self, name: &str) -> Result<TenantConfig> {
        if let Ok(tenant) = self.get_tenant(name) {
            return Ok(tenant);
        }

        if let Some(tenant) = self.load_env_file(name)? {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        Err(Exp365Error::TenantNotFound(name.to_string()))
    }
}

/// Parse `KEY=VALUE` lines, ignoring comments and stripping quotes. Keys are upper-cased.
fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim();
            let value = if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                &value[1..value.len() - 1]
            } else {
                value
            };
            vars.insert(key.trim().to_uppercase(), value.to_string());
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, ConfigManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path()).unwrap();
        (dir, manager)
    }

    fn tenant(name: &str) -> TenantConfig {
        TenantConfig {
            name: name.to_string(),
            tenant_id: "tid".to_string(),
            client_id: "cid".to_string(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
        }
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let (_dir, manager) = manager();
        let config = manager.load_config().unwrap();
        assert!(config.current_tenant.is_none());
        assert_eq!(config.export.lookback_days, 7);
        assert_eq!(config.export.max_retries, 0);
    }

    #[test]
    fn test_partial_export_section() {
        let (_dir, manager) = manager();
        fs::write(
            manager.config_file(),
            "current_tenant = \"ACME\"\n[export]\nrequest_delay_ms = 250\n",
        )
        .unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config.current_tenant.as_deref(), Some("ACME"));
        assert_eq!(config.export.request_delay_ms, 250);
        assert_eq!(config.export.output_dir, PathBuf::from("./export"));
    }

    #[test]
    fn test_add_switch_remove_tenant() {
        let (_dir, manager) = manager();
        manager.add_tenant(tenant("ACME")).unwrap();
        manager.add_tenant(tenant("CONTOSO")).unwrap();
        manager.set_active_tenant("acme").unwrap();

        assert_eq!(manager.resolve_tenant(None).unwrap().name, "ACME");
        assert_eq!(manager.resolve_tenant(Some("CONTOSO")).unwrap().name, "CONTOSO");

        manager.remove_tenant("ACME").unwrap();
        assert!(manager.load_config().unwrap().current_tenant.is_none());
        assert!(matches!(
            manager.remove_tenant("ACME"),
            Err(Exp365Error::TenantNotFound(_))
        ));
    }

    #[test]
    fn test_remove_tenant_deletes_token_by_stored_name() {
        let (_dir, manager) = manager();
        manager.add_tenant(tenant("contoso")).unwrap();
        let token = TokenCache {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            tenant_id: "tid".into(),
        };
        manager.save_token("contoso", &token).unwrap();
        assert!(manager.token_cache_file("contoso").exists());

        manager.remove_tenant("CONTOSO").unwrap();
        assert!(!manager.token_cache_file("contoso").exists());
        assert!(manager.load_tenants().unwrap().is_empty());
    }

    #[test]
    fn test_expired_token_is_auth_error() {
        let (_dir, manager) = manager();
        let token = TokenCache {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: chrono::Utc::now() - chrono::Duration::minutes(5),
            tenant_id: "tid".into(),
        };
        manager.save_token("ACME", &token).unwrap();
        assert!(matches!(
            manager.load_token("ACME"),
            Err(Exp365Error::AuthError(_))
        ));
        assert!(matches!(
            manager.load_token("OTHER"),
            Err(Exp365Error::TokenNotFound)
        ));
    }

    #[test]
    fn test_env_file_import() {
        let (_dir, manager) = manager();
        fs::write(
            manager.config_dir().join("acme.env"),
            "# Client: Acme\nTENANT_ID=\"t-1\"\nclient_id=c-1\nCLIENT_SECRET='s3cret'\n",
        )
        .unwrap();

        let tenant = manager.get_tenant_or_env("ACME").unwrap();
        assert_eq!(tenant.tenant_id, "t-1");
        assert_eq!(tenant.client_id, "c-1");
        assert_eq!(tenant.auth_type, AuthType::ClientCredentials);
        // imported into tenants.toml
        assert_eq!(manager.load_tenants().unwrap().len(), 1);
    }
}
