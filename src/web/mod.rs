//! Scrape endpoint serving the collected metrics.

pub mod config;
pub mod handlers;

// Re-export commonly used items
pub use config::WebConfig;

use crate::error::{ExporterError, Result};
use crate::metrics::PrometheusSink;
use axum::{routing::get, Router};
use handlers::AppState;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router: the exposition path, `/health` and an index page.
pub fn create_app(config: &WebConfig, sink: Arc<PrometheusSink>) -> Router {
    let state = AppState {
        sink,
        metrics_path: config.metrics_path.clone(),
    };

    Router::new()
        .route(&config.metrics_path, get(handlers::metrics))
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::index))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve metrics until `shutdown` completes.
pub async fn start_metrics_server<S>(
    config: WebConfig,
    sink: Arc<PrometheusSink>,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = create_app(&config, sink);
    let addr = config.bind_address();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ExporterError::web_server_error(format!("Failed to bind to {}: {}", addr, e)))?;

    info!(
        "Serving metrics on http://{}{}",
        listener.local_addr().map(|a| a.to_string()).unwrap_or(addr),
        config.metrics_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ExporterError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricsSink, SampleLabels};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn sink() -> Arc<PrometheusSink> {
        let sink = PrometheusSink::new().unwrap();
        sink.set_gauge(
            &SampleLabels {
                name: "Sensor".to_string(),
                did: "10".to_string(),
                model: "lumi.sensor_ht.v1".to_string(),
                key: "temperature humidity sensor/temperature".to_string(),
            },
            21.5,
        );
        Arc::new(sink)
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let app = create_app(&WebConfig::default(), sink());
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(r#"did="10""#));
        assert!(text.contains("} 21.5"));
    }

    #[tokio::test]
    async fn test_custom_metrics_path_and_health() {
        let config = WebConfig::default().with_metrics_path("/scrape");
        let app = create_app(&config, sink());

        let response = app
            .clone()
            .oneshot(Request::get("/scrape").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let config = WebConfig::new("127.0.0.1", 0);
        let result = start_metrics_server(config, sink(), async {}).await;
        assert!(result.is_ok());
    }
}
