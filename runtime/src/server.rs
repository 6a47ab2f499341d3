//! HTTP route surface: `GET /nad/` serves the aggregated collection.
//!
//! The result's `ttl` is echoed as `Cache-Control: max-age` for whatever
//! cache sits in front; nothing is cached here. There is no write route.

use crate::error::NadError;
use crate::provider::{DataRequest, Provider};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Build the router over a shared provider.
pub fn router(provider: Arc<Provider>) -> Router {
    Router::new()
        .route("/nad", get(get_data))
        .route("/nad/", get(get_data))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(provider)
}

/// Serve on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    provider: Arc<Provider>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }
    axum::serve(listener, router(provider))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn get_data(
    State(provider): State<Arc<Provider>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    match provider.get_data(&DataRequest::new(query)).await {
        Ok(result) => {
            let cache_control = format!("max-age={}", result.ttl);
            ([(header::CACHE_CONTROL, cache_control)], Json(result)).into_response()
        }
        Err(e) => {
            error!("get_data failed: {e}");
            let status = match &e {
                NadError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(serde_json::json!({"error": e.to_string()}))).into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::http_client::{HttpClient, DEFAULT_USER_AGENT};
    use crate::config::NadConfig;
    use crate::provider::SourceCatalog;
    use crate::pipeline::aggregator::Aggregator;

    async fn spawn(provider: Provider) -> (String, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, Arc::new(provider), shutdown.clone()));
        (base, shutdown)
    }

    fn transport() -> Arc<HttpClient> {
        Arc::new(HttpClient::new(DEFAULT_USER_AGENT).unwrap())
    }

    #[tokio::test]
    async fn test_empty_catalog_serves_empty_collection() {
        let mut config = NadConfig::default();
        config.ttl = 90;
        let (base, shutdown) = spawn(Provider::from_config(&config, transport())).await;

        let resp = reqwest::get(format!("{base}/nad/?where=1%3D1")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "max-age=90");
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["ttl"], 90);
        assert_eq!(body["features"], serde_json::json!([]));
        assert_eq!(body["metadata"]["name"], "Nationwide Address Dataset");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_unloadable_catalog_is_service_unavailable() {
        let config = NadConfig::default();
        let provider = Provider::new(
            Aggregator::from_config(&config, transport()),
            SourceCatalog::File("/nonexistent/nad.json".into()),
        );
        let (base, shutdown) = spawn(provider).await;

        let resp = reqwest::get(format!("{base}/nad")).await.unwrap();
        assert_eq!(resp.status(), 503);

        let health = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(health.status(), 200);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_no_write_route() {
        let (base, shutdown) = spawn(Provider::from_config(&NadConfig::default(), transport())).await;

        let resp = reqwest::Client::new()
            .put(format!("{base}/nad/"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 405);

        shutdown.cancel();
    }
}
