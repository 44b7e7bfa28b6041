pub mod login;
pub mod planner;
pub mod progress;
pub mod service_principal;
pub mod signins;
pub mod tenant;

use crate::config::{ConfigManager, ExportDefaults};
use crate::error::Result;
use crate::graph::GraphClient;
use crate::report::OutputFormat;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every export command
#[derive(Args, Debug, Clone)]
pub struct ExportOptions {
    /// Output directory (default: export.output_dir from config.toml)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fixed pause before every Graph request, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Artifacts to write
    #[arg(short, long, value_enum, default_value_t = OutputFormat::All)]
    pub format: OutputFormat,

    /// Tenant to export from (default: active tenant)
    #[arg(short, long)]
    pub tenant: Option<String>,
}

/// Authenticated client plus the resolved output settings for one run
pub struct ExportContext {
    pub client: GraphClient,
    pub tenant_name: String,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub defaults: ExportDefaults,
}

impl ExportOptions {
    /// Load the tenant token and apply CLI overrides on top of config defaults
    pub async fn connect(&self) -> Result<ExportContext> {
        let config_manager = ConfigManager::new()?;
        let tenant = config_manager.resolve_tenant(self.tenant.as_deref())?;
        let defaults = config_manager.load_config()?.export;

        let mut client = GraphClient::from_config(&config_manager, &tenant.name).await?;
        if let Some(delay_ms) = self.delay_ms {
            client = client.with_request_delay(Duration::from_millis(delay_ms));
        }

        let output_dir = self
            .output
            .clone()
            .unwrap_or_else(|| defaults.output_dir.clone());

        tracing::debug!(
            tenant = %tenant.name,
            output = %output_dir.display(),
            format = ?self.format,
            "Export context ready"
        );

        Ok(ExportContext {
            client,
            tenant_name: tenant.name,
            output_dir,
            format: self.format,
            defaults,
        })
    }
}
