//! Datalens API Server
//!
//! Run with: cargo run --bin datalens
//!
//! # Configuration
//!
//! Read from `$DATALENS_CONFIG` when set, otherwise from the default
//! locations (see [`Config::load_default`]), then overridden by `DATALENS_*`
//! environment variables. `RUST_LOG` takes precedence over `logging.level`.

use anyhow::Context;
use datalens::api::{serve, AppState};
use datalens::config::{Config, LoggingConfig};
use datalens::index::{IndexStore, IndexStoreConfig};
use datalens::service::DatasetService;
use datalens::snapshot::SnapshotLoader;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("DATALENS_CONFIG") {
        Ok(path) => Config::load_with_env(&PathBuf::from(path))?,
        Err(_) => Config::load_default(),
    };

    init_tracing(&config.logging);

    tracing::info!("Starting Datalens API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Sandbox root: {}", config.sandbox.root);
    tracing::info!("Index database: {}", config.index.db_path);

    // Store connection failures at startup are fatal
    let mut store_config = IndexStoreConfig::new(&config.index.db_path);
    store_config.busy_timeout = config.index.busy_timeout();
    let store = IndexStore::open(store_config)
        .with_context(|| format!("opening index store at {}", config.index.db_path))?;

    let service = DatasetService::new(store, SnapshotLoader::filesystem())
        .with_request_timeout(config.api.request_timeout())
        .with_default_top_n(config.metrics.default_top_n);

    if config.index.enable_cache {
        let swept = service
            .drop_unready()
            .await
            .context("resetting half-built indexes")?;
        if !swept.is_empty() {
            tracing::info!("Reset {} half-built indexes", swept.len());
        }
    }

    let state = AppState::new(service, config.sandbox.root_path());
    serve(state, &config.api.addr())
        .await
        .with_context(|| format!("serving on {}", config.api.addr()))?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let default_filter = format!("datalens={},tower_http=debug", logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if logging.is_json() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
