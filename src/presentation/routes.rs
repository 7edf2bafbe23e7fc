//! Axum router assembly.

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_asset, get_control, get_page, health_check, version};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/version", get(version))
        .route("/dashboards/:dashboard/control", get(get_control))
        .route("/dashboards/:dashboard/pages/:page", get(get_page))
        .route("/dashboards/:dashboard/assets/*path", get(get_asset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
