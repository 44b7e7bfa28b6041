use clap::{Parser, Subcommand};
use colored::Colorize;
use exp365::cmd;
use exp365::config::ConfigManager;
use exp365::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "exp365",
    about = "Export Microsoft 365 Planner, sign-in and service principal data",
    version,
    long_about = "Pages data out of Microsoft Graph and writes JSON, Excel and HTML reports.\n\n\
                  Planner tasks with comments, Entra ID sign-in logs and service principal\n\
                  configuration, one tenant at a time."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate to Microsoft Graph API
    Login(cmd::login::LoginArgs),

    /// Logout and clear cached credentials
    Logout(cmd::login::LogoutArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// Planner task exports
    #[command(subcommand)]
    Planner(PlannerCommands),

    /// Entra ID sign-in log reports
    #[command(subcommand)]
    Signins(SignInCommands),

    /// Service principal configuration exports
    #[command(subcommand)]
    Sp(SpCommands),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List all configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Switch active tenant
    Switch(cmd::tenant::TenantSwitchArgs),

    /// Remove a tenant configuration
    Remove(cmd::tenant::TenantRemoveArgs),
}

#[derive(Subcommand, Debug)]
enum PlannerCommands {
    /// Export tasks, assignees and comments of one or more plans
    Export(cmd::planner::PlannerExportArgs),
}

#[derive(Subcommand, Debug)]
enum SignInCommands {
    /// Export sign-ins over a lookback window with a daily chart
    Report(cmd::signins::SignInReportArgs),
}

#[derive(Subcommand, Debug)]
enum SpCommands {
    /// Export owners, role assignments, grants and credentials
    Export(cmd::service_principal::SpExportArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// `--verbose` wins, then `RUST_LOG`, then `log_level` from config.toml
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("exp365=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = ConfigManager::new()
                .and_then(|manager| manager.load_config())
                .ok()
                .and_then(|config| config.log_level)
                .unwrap_or_else(|| "warn".to_string());
            EnvFilter::new(format!("exp365={}", level))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Login(args) => cmd::login::login(args).await?,
        Commands::Logout(args) => cmd::login::logout(args).await?,
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(args).await?,
            TenantCommands::List(args) => cmd::tenant::list(args).await?,
            TenantCommands::Switch(args) => cmd::tenant::switch(args).await?,
            TenantCommands::Remove(args) => cmd::tenant::remove(args).await?,
        },
        Commands::Planner(planner_cmd) => match planner_cmd {
            PlannerCommands::Export(args) => cmd::planner::export(args).await?,
        },
        Commands::Signins(signin_cmd) => match signin_cmd {
            SignInCommands::Report(args) => cmd::signins::report(args).await?,
        },
        Commands::Sp(sp_cmd) => match sp_cmd {
            SpCommands::Export(args) => cmd::service_principal::export(args).await?,
        },
    }

    Ok(())
}
