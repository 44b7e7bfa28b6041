use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{Exp365Error, Result};
use crate::graph::auth::{GraphAuth, REQUIRED_SCOPES};
use clap::Args;
use colored::Colorize;

/// First `n` characters, safe for non-ASCII input
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant name; falls back to <config dir>/{name}.env when not configured yet
    #[arg(index = 1)]
    name: Option<String>,

    /// Tenant name (alias for the positional argument)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Entra ID tenant ID
    #[arg(long)]
    tenant_id: Option<String>,

    /// Application (client) ID
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow instead of device code
    #[arg(long)]
    client_credentials: bool,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,

    /// Import from .env file only (don't authenticate)
    #[arg(long)]
    import_only: bool,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name
    #[arg(short, long)]
    tenant: Option<String>,

    /// Logout from all tenants
    #[arg(long)]
    all: bool,
}

fn tenant_not_found_help(config_manager: &ConfigManager, name: &str) -> Exp365Error {
    Exp365Error::ConfigError(format!(
        "Tenant '{}' not found.\n\n\
        Options:\n\
        1. exp365 tenant add {} --tenant-id <id> --client-id <id>\n\n\
        2. Create {} with:\n   \
           TENANT_ID=your-tenant-id\n   \
           CLIENT_ID=your-client-id\n   \
           CLIENT_SECRET=your-secret",
        name,
        name,
        config_manager
            .config_dir()
            .join(format!("{}.env", name.to_lowercase()))
            .display()
    ))
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    let tenant_name = args.name.as_ref().or(args.tenant.as_ref());

    let tenant_config = if let Some(name) = tenant_name {
        let tenant = match config_manager.get_tenant_or_env(name) {
            Ok(tenant) => tenant,
            Err(Exp365Error::TenantNotFound(_)) => {
                return Err(tenant_not_found_help(&config_manager, name));
            }
            Err(e) => return Err(e),
        };

        println!(
            "{} Loaded tenant: {} ({})",
            "✓".green(),
            tenant.name.bold(),
            tenant.description.as_deref().unwrap_or("")
        );
        println!("  Tenant ID: {}...", truncate_chars(&tenant.tenant_id, 8));
        println!("  Client ID: {}...", truncate_chars(&tenant.client_id, 8));
        match tenant.auth_type {
            AuthType::ClientCredentials => println!("  Auth: Client Credentials"),
            AuthType::DeviceCode => println!("  Auth: Device Code Flow"),
        }

        if args.import_only {
            println!(
                "\n{} Import complete. Run 'exp365 login {}' to authenticate.",
                "→".cyan(),
                tenant.name
            );
            return Ok(());
        }

        tenant
    } else if let (Some(tenant_id), Some(client_id)) = (&args.tenant_id, &args.client_id) {
        println!(
            "\n{} Quick setup mode: Creating tenant configuration...",
            "→".cyan()
        );

        let name = tenant_id
            .split('-')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("default")
            .to_string();
        println!(
            "{} Auto-generated tenant name: {}",
            "→".cyan(),
            name.bold()
        );

        let auth_type = if args.client_credentials || args.client_secret.is_some() {
            AuthType::ClientCredentials
        } else {
            AuthType::DeviceCode
        };

        let tenant = TenantConfig {
            name: name.clone(),
            tenant_id: tenant_id.clone(),
            client_id: client_id.clone(),
            client_secret: args.client_secret.clone(),
            auth_type,
            description: args.description.clone(),
        };

        config_manager.add_tenant(tenant.clone())?;
        println!("{} Tenant '{}' configuration saved", "✓".green(), name);

        tenant
    } else {
        return Err(Exp365Error::InvalidConfig(
            "Usage:\n  \
            exp365 login NAME                           # Configured tenant or NAME.env\n  \
            exp365 login --tenant-id ID --client-id ID  # Quick setup"
                .into(),
        ));
    };

    let result = match tenant_config.auth_type {
        AuthType::DeviceCode => auth.login_device_code(&tenant_config).await,
        AuthType::ClientCredentials => auth.login_client_credentials(&tenant_config).await,
    };

    if let Err(e) = result {
        tracing::debug!(tenant = %tenant_config.name, "Authentication failed: {}", e);
        return Err(e);
    }

    config_manager.set_active_tenant(&tenant_config.name)?;

    println!(
        "\n{} Active tenant: {}",
        "→".cyan(),
        tenant_config.name.bold()
    );
    println!(
        "{} Exports need these Graph permissions: {}",
        "→".cyan(),
        REQUIRED_SCOPES.join(", ").dimmed()
    );
    Ok(())
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    if args.all {
        for tenant in &config_manager.load_tenants()? {
            auth.logout(&tenant.name)?;
        }
        println!("{} Logged out from all tenants", "✓".green());
    } else if let Some(tenant_name) = &args.tenant {
        auth.logout(tenant_name)?;
    } else {
        match config_manager.load_config()?.current_tenant {
            Some(current_tenant) => auth.logout(&current_tenant)?,
            None => println!("{} No active tenant", "!".yellow()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("åäö-1234", 3), "åäö");
        assert_eq!(truncate_chars("ab", 8), "ab");
    }

    #[test]
    fn test_tenant_not_found_help_names_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_manager = ConfigManager::with_dir(dir.path()).unwrap();
        let message = tenant_not_found_help(&config_manager, "Contoso").to_string();
        assert!(message.contains("contoso.env"));
        assert!(message.contains("exp365 tenant add Contoso"));
    }
}
