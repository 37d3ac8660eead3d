//! HTTP handlers for the scrape endpoint.

use crate::metrics::PrometheusSink;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Shared state of the web handlers.
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<PrometheusSink>,
    pub metrics_path: String,
}

/// Text exposition of all registered metrics.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.sink.render() {
        Ok(body) => ([(header::CONTENT_TYPE, state.sink.content_type())], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "mi-exporter",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Landing page pointing at the exposition path.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><title>Mi Exporter</title></head>\n\
         <body><h1>Mi Exporter</h1><p><a href=\"{path}\">{path}</a></p></body></html>\n",
        path = state.metrics_path
    ))
}
