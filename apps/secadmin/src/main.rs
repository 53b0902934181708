mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use security_admin::Service;
use static_catalog_plugin::StaticCatalog;
use tracing_subscriber::EnvFilter;

use crate::commands::{Change, ChangeArgs, RoleCommand};
use crate::config::{AppConfig, LoggingConfig};

/// Security admin - inspect and edit SQL Server permissions
#[derive(Parser)]
#[command(name = "secadmin")]
#[command(about = "Inspect and edit permissions, roles and memberships")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the permission states on a securable
    Securable {
        /// URN of the securable
        urn: String,
        /// Only show this principal
        #[arg(long)]
        principal: Option<String>,
    },
    /// Show the permission states of a principal
    Principal {
        name: String,
        /// Database of a user or database role
        #[arg(long)]
        database: Option<String>,
    },
    /// Grant a permission
    Grant {
        #[command(flatten)]
        change: ChangeArgs,
        /// Allow the grantee to grant onward
        #[arg(long)]
        with_grant: bool,
    },
    /// Deny a permission
    Deny {
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// Revoke a permission
    Revoke {
        #[command(flatten)]
        change: ChangeArgs,
    },
    /// Show or edit a role
    Role {
        #[command(subcommand)]
        command: RoleCommand,
    },
    /// Validate configuration and exit
    Check,
}

fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // Ignore error if already initialized
    if cfg.json {
        builder.json().try_init().ok();
    } else {
        builder.try_init().ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (SECADMIN__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_verbosity(cli.verbose);
    init_logging(&config.logging);

    let catalog = Arc::new(StaticCatalog::from_config(&config.catalog));
    let service = Service::new(
        catalog.clone(),
        catalog.clone(),
        catalog.clone(),
        config.security_admin,
    );
    tracing::info!("security admin ready");

    let out = commands::Output { json: cli.json };
    match cli.command {
        Commands::Securable { urn, principal } => {
            commands::show_securable(&service, &urn, principal.as_deref(), out).await
        }
        Commands::Principal { name, database } => {
            commands::show_principal(&service, &name, database.as_deref(), out).await
        }
        Commands::Grant { change, with_grant } => {
            commands::change(&service, &change, Change::Grant { with_grant }, out).await
        }
        Commands::Deny { change } => {
            commands::change(&service, &change, Change::Deny, out).await
        }
        Commands::Revoke { change } => {
            commands::change(&service, &change, Change::Revoke, out).await
        }
        Commands::Role { command } => commands::role(&service, &command, out).await,
        Commands::Check => {
            println!("Configuration is valid");
            Ok(())
        }
    }
}
