//! Pakhuis Server - a replicated JSON document store.
//!
//! This crate wires the pakhuis-engine logic to SQLite persistence, an
//! HTTP API and per-peer replication tasks.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod routes;
pub mod store;
pub mod sync;

use crate::store::Store;
use crate::sync::SyncBoard;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub sync: SyncBoard,
}

/// Build the HTTP application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
