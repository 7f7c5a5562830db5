//! Service entry point: configuration, logging, store loading, wiring.

use anyhow::Context;
use arden_engine::Engine;
use arden_engine::terminology::{HttpTerminology, InMemoryCache};
use arden_server::config::ServerConfig;
use arden_server::{AppState, create_app};
use arden_spec::SpecStore;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let store = SpecStore::load_dir(&config.spec_dir).with_context(|| {
        format!(
            "loading specification store from {}",
            config.spec_dir.display()
        )
    })?;
    info!(
        services = store.services().len(),
        "specification store loaded"
    );

    let cache = Arc::new(InMemoryCache::new(Duration::from_secs(
        config.cache_ttl_secs,
    )));
    let terminology = Arc::new(HttpTerminology::new(&config.terminology_url, cache));
    let engine = Arc::new(Engine::new(terminology));
    let state = AppState::new(Arc::new(store), engine);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "arden-server listening");

    axum::serve(listener, create_app(state))
        .await
        .context("server error")?;
    Ok(())
}
