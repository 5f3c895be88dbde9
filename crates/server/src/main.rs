//! Alcove server binary.

use alcove_core::Tenant;
use alcove_core::config::AppConfig;
use alcove_server::{AppState, create_router};
use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Alcove - a multi-tenant settings store
#[derive(Parser, Debug)]
#[command(name = "alcoved")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "ALCOVE_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Alcove v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override
    // everything).
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("ALCOVE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    let store = alcove_storage::from_config(&config.database)
        .await
        .context("failed to initialize settings store")?;

    // Catch configuration and connectivity errors before accepting traffic.
    store
        .health_check()
        .await
        .context("database health check failed")?;
    tracing::info!("Settings database connectivity verified");

    // Provision configured tenants up front; init is idempotent, so listing
    // the same tenant across restarts and upgrades is fine.
    for name in &config.server.tenants {
        let tenant = Tenant::parse(name)
            .with_context(|| format!("invalid tenant '{name}' in configuration"))?;
        store
            .init_tenant(&tenant)
            .await
            .with_context(|| format!("failed to provision tenant '{tenant}'"))?;
        tracing::info!(tenant = %tenant, "tenant storage provisioned");
    }

    let bind = config.server.bind.clone();
    let state = AppState::new(config, store);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %bind, "Server listening");
    axum::serve(listener, router)
        .await
        .context("server error")?;
    Ok(())
}
