// HTTP request handlers
use crate::domain::render::OutputFormat;
use crate::infrastructure::http_response::{bytes_response, error_response, page_response};
use crate::presentation::app_state::AppState;
use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::services::ServeDir;

#[derive(Deserialize)]
pub struct ControlQuery {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub page: String,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub format: String,
}

fn invalid_page_number() -> Response {
    (StatusCode::BAD_REQUEST, "invalid page number").into_response()
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn version() -> String {
    format!("Dashboard {}", env!("CARGO_PKG_VERSION"))
}

/// Next page index for the display, as plain text
pub async fn get_control(
    Path(dashboard): Path<String>,
    Query(query): Query<ControlQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    tracing::info!(dashboard = %dashboard, action = %query.action, page = %query.page, "get control");

    let Ok(page) = query.page.parse::<i64>() else {
        return invalid_page_number();
    };

    match state
        .render_service
        .next_page(&dashboard, page, &query.action)
        .await
    {
        Ok(next) => bytes_response(Bytes::from(next.to_string()), "text/plain; charset=utf-8"),
        Err(e) => error_response(&dashboard, e),
    }
}

/// Render one page as html or an image
pub async fn get_page(
    Path((dashboard, page)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    tracing::info!(dashboard = %dashboard, page = %page, format = %query.format, "get page");

    let Ok(page) = page.parse::<i64>() else {
        return invalid_page_number();
    };
    let format = match query.format.parse::<OutputFormat>() {
        Ok(format) => format,
        Err(e) => return error_response(&dashboard, e.into()),
    };

    match state.render_service.render(&dashboard, page, format).await {
        Ok(rendered) => page_response(rendered),
        Err(e) => error_response(&dashboard, e),
    }
}

/// Static files from `<dashboard_dir>/<dashboard>/assets`
pub async fn get_asset(
    Path((dashboard, path)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Response {
    tracing::info!(dashboard = %dashboard, path = %path, "get asset");

    if dashboard.contains(['/', '\\']) || dashboard == ".." || dashboard == "." {
        return StatusCode::NOT_FOUND.into_response();
    }

    // "/dashboards/<dashboard>/assets/<path>", still percent-encoded
    let relative = request.uri().path().splitn(5, '/').nth(4).unwrap_or_default();
    let Ok(uri) = format!("/{relative}").parse::<Uri>() else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let (mut parts, body) = request.into_parts();
    parts.uri = uri;

    let mut assets = ServeDir::new(state.dashboard_dir.join(&dashboard).join("assets"));
    match assets.try_call(Request::from_parts(parts, body)).await {
        Ok(response) => response.map(Body::new),
        Err(e) => {
            tracing::error!(dashboard = %dashboard, path = %path, err = %e, "failed to serve asset");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
