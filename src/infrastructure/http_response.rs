// HTTP response utilities for rendered pages and render failures
use crate::application::render_service::{RenderError, RenderedPage};
use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;

/// Body with explicit Content-Type and Content-Length
pub fn bytes_response(body: Bytes, content_type: &'static str) -> Response<Body> {
    let length = HeaderValue::from(body.len());
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, length);
    response
}

pub fn page_response(page: RenderedPage) -> Response<Body> {
    bytes_response(page.body, page.content_type)
}

pub fn status_of(err: &RenderError) -> StatusCode {
    match err {
        RenderError::DashboardNotFound(_) => StatusCode::NOT_FOUND,
        RenderError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        err if err.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log `err` at a level matching who caused it and turn it into a plain-text response
pub fn error_response(dashboard: &str, err: RenderError) -> Response<Body> {
    let status = status_of(&err);
    let message = err.to_string();
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
        tracing::error!(dashboard = %dashboard, status = status.as_u16(), err = %message, "request failed");
    } else {
        tracing::info!(dashboard = %dashboard, status = status.as_u16(), err = %message, "request rejected");
    }
    (status, message).into_response()
}
