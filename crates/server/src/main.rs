mod bootstrap;
mod health;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use tollgate_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use tollgate_gateway::{InMemoryObjectStore, ObjectStore};

#[derive(Debug, Parser)]
#[command(name = "tollgate-server", version, about = "Access-control and quota gateway")]
struct Cli {
    /// Path to the TOML config file. When given, the file must exist.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides database.url from file and environment.
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// Overrides scheduler.base_url.
    #[arg(long, value_name = "URL")]
    scheduler_url: Option<String>,

    /// Overrides logging.level (trace|debug|info|warn|error).
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn load_options(self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config,
            overrides: ConfigOverrides {
                database_url: self.database_url,
                scheduler_base_url: self.scheduler_url,
                log_level: self.log_level,
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use tollgate_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli.load_options()).await
}

pub async fn run(options: LoadOptions) -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(options)?;
    init_logging(&config);

    // No object-store backend is wired yet; tenant deletions will report
    // zero storage objects until one replaces this.
    let storage: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());

    let app = bootstrap::bootstrap_with_config(config, storage).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    // Scheduled-job creation needs a provisioned settings row; surface a
    // missing one at startup instead of on the first create.
    if app.tenant_service.current_settings().await?.is_none() {
        tracing::warn!(
            event_name = "system.server.settings_missing",
            correlation_id = "bootstrap",
            "server settings are not provisioned; job creation will fail until a version is inserted"
        );
    }

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "tollgate-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "tollgate-server stopping"
    );

    let shutdown_window = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let _ = tokio::time::timeout(shutdown_window, app.db_pool.close()).await;

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
