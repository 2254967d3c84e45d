//! Remark42 HTTP server binary.

use clap::Parser;
use remark42::cache::MemoryCache;
use remark42::config::EngineConfig;
use remark42::engine::{Engine, RocksEngine};
use remark42::service::DataService;
use remark42_server::config::Args;
use remark42_server::{router, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "remark42_server=info,remark42=info,tower_http=debug".into()
        }))
        .init();

    let args = Args::parse();
    let service_config = args.service_config();
    service_config.validate()?;

    let engine = Arc::new(RocksEngine::new(
        &args.db_root,
        &args.sites,
        EngineConfig::for_server(),
    )?);
    info!(sites = ?engine.sites(), root = %args.db_root.display(), "engine ready");

    let service = Arc::new(DataService::new(engine.clone(), service_config));
    let cache = Arc::new(MemoryCache::new(args.cache_config()));
    let app = router(AppState::new(service, cache), args.request_timeout());

    let listener = TcpListener::bind(args.bind).await?;
    info!("Remark42 server running on http://{}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = engine.close() {
        error!(error = %e, "failed to close engine");
    }
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
