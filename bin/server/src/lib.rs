//! Remark42 HTTP server
//!
//! JSON API over the comment core. Reads go through the scoped loading
//! cache: cache key, engine, moderation view, optional tree, bytes. Writes
//! go through the data service and then flush the scopes they touched.
//!
//! ## Usage
//!
//! ```bash
//! # Serve two sites
//! REMARK_SECRET=secret remark42-server --sites radio-t,blog --db-root /srv/remark
//!
//! # Enable debug logging
//! RUST_LOG=debug REMARK_SECRET=secret remark42-server
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;

use axum::routing::{delete, get, post, put};
use axum::Router;
use remark42::cache::LoadingCache;
use remark42::service::DataService;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DataService>,
    pub cache: Arc<dyn LoadingCache>,
}

impl AppState {
    pub fn new(service: Arc<DataService>, cache: Arc<dyn LoadingCache>) -> Self {
        Self { service, cache }
    }

    /// Drops every cached response depending on `scopes`.
    pub fn flush(&self, scopes: &[String]) {
        let removed = self.cache.flush(scopes);
        debug!(scopes = ?scopes, removed = removed, "flushed cached responses");
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.service)
            .field("cache", &self.cache.stat())
            .finish()
    }
}

/// Builds the API router.
pub fn router(state: AppState, timeout: Duration) -> Router {
    let public = Router::new()
        .route("/ping", get(handlers::ping))
        .route("/api/v1/comment", post(handlers::create_comment))
        .route("/api/v1/comment/:id", put(handlers::edit_comment))
        .route("/api/v1/id/:id", get(handlers::get_comment))
        .route("/api/v1/find", get(handlers::find))
        .route("/api/v1/last/:max", get(handlers::last))
        .route("/api/v1/comments", get(handlers::user_comments))
        .route("/api/v1/count", get(handlers::count))
        .route("/api/v1/counts", post(handlers::counts))
        .route("/api/v1/list", get(handlers::list))
        .route("/api/v1/vote/:id", put(handlers::vote));

    let admin = Router::new()
        .route("/comment/:id", delete(handlers::admin::delete_comment))
        .route("/pin/:id", put(handlers::admin::pin))
        .route(
            "/user/:uid",
            put(handlers::admin::block).delete(handlers::admin::delete_user),
        )
        .route("/blocked", get(handlers::admin::blocked))
        .route("/readonly", put(handlers::admin::read_only))
        .route("/verify/:uid", put(handlers::admin::verify))
        .route("/export", get(handlers::admin::export))
        .route("/import", post(handlers::admin::import));

    Router::new()
        .merge(public)
        .nest("/api/v1/admin", admin)
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}
