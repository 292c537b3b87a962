//! HTTP route definitions.

mod admin;
mod docs;
mod health;
mod search;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(docs::routes())
        .merge(search::routes())
        .merge(sync::routes())
        .merge(admin::routes())
}
