//! HTTP Controller (Driver Adapter)
//!
//! Axum-based REST API that delegates to the ingest use case.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::application::services::{AdaptiveBatchSizer, ExecutionPublisher};
use crate::application::use_cases::IngestBatchUseCase;
use crate::domain::batch::BatchStatus;
use crate::domain::execution::ExecutionRepository;
use crate::error::ApiError;

use super::request::BatchIngestRequest;
use super::response::HealthResponse;

/// Application state shared across handlers.
pub struct AppState<R>
where
    R: ExecutionRepository + 'static,
{
    /// Use case for ingesting batches.
    pub ingest: Arc<IngestBatchUseCase<R>>,
    /// Publisher, for statistics.
    pub publisher: Arc<ExecutionPublisher>,
    /// Chunk sizer, for statistics.
    pub sizer: Arc<AdaptiveBatchSizer>,
    /// Prometheus handle when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
    /// Application version.
    pub version: String,
}

impl<R> Clone for AppState<R>
where
    R: ExecutionRepository + 'static,
{
    fn clone(&self) -> Self {
        Self {
            ingest: Arc::clone(&self.ingest),
            publisher: Arc::clone(&self.publisher),
            sizer: Arc::clone(&self.sizer),
            metrics: self.metrics.clone(),
            version: self.version.clone(),
        }
    }
}

/// Create the HTTP router with all endpoints.
pub fn create_router<R>(state: AppState<R>) -> Router
where
    R: ExecutionRepository + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/api/v1/executions/batch", post(ingest_batch))
        .route("/api/v1/executions/batch/stats", get(batch_stats))
        .route("/api/v1/executions/publisher/stats", get(publisher_stats))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check<R>(State(state): State<AppState<R>>) -> impl IntoResponse
where
    R: ExecutionRepository + 'static,
{
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        circuit_breaker: state.publisher.circuit_breaker().state(),
    })
}

/// Batch-create endpoint.
///
/// 201 when every item was stored, 207 when some were, 400 when none were
/// or the batch was rejected outright.
async fn ingest_batch<R>(
    State(state): State<AppState<R>>,
    body: Result<Json<BatchIngestRequest>, JsonRejection>,
) -> Response
where
    R: ExecutionRepository + 'static,
{
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected malformed batch body");
            return ApiError::invalid_request(rejection.body_text()).into_response();
        }
    };

    match state.ingest.execute(request.executions).await {
        Ok(result) => {
            let status = match result.status {
                BatchStatus::Success => StatusCode::CREATED,
                BatchStatus::PartialSuccess => StatusCode::MULTI_STATUS,
                BatchStatus::Failed => StatusCode::BAD_REQUEST,
            };
            (status, Json(result)).into_response()
        }
        Err(e) => {
            tracing::info!(error = %e, "Batch rejected");
            ApiError::from(e).into_response()
        }
    }
}

/// Adaptive sizing and pool statistics.
async fn batch_stats<R>(State(state): State<AppState<R>>) -> impl IntoResponse
where
    R: ExecutionRepository + 'static,
{
    Json(state.sizer.stats())
}

/// Publisher counters and breaker state.
async fn publisher_stats<R>(State(state): State<AppState<R>>) -> impl IntoResponse
where
    R: ExecutionRepository + 'static,
{
    Json(state.publisher.stats())
}

/// Prometheus scrape endpoint.
async fn render_metrics<R>(State(state): State<AppState<R>>) -> Response
where
    R: ExecutionRepository + 'static,
{
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::{
        AdaptiveSizingConfig, BulkPersistenceService, PersistenceSettings, PublisherConfig,
    };
    use crate::infrastructure::messaging::InMemoryEventStream;
    use crate::infrastructure::persistence::{
        ConnectionPool, ConnectionPoolConfig, InMemoryExecutionStore,
    };
    use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        let store = Arc::new(InMemoryExecutionStore::new(Arc::new(ConnectionPool::new(
            ConnectionPoolConfig::default(),
        ))));
        let stream = Arc::new(InMemoryEventStream::new());
        let sizer = Arc::new(AdaptiveBatchSizer::new(AdaptiveSizingConfig::default(), None));
        let publisher = Arc::new(ExecutionPublisher::new(
            stream.clone(),
            stream,
            Arc::new(CircuitBreaker::new("event-stream", CircuitBreakerConfig::default())),
            PublisherConfig::default(),
        ));
        let ingest = Arc::new(IngestBatchUseCase::new(
            Arc::clone(&sizer),
            BulkPersistenceService::new(store, PersistenceSettings::default()),
            Arc::clone(&publisher),
            2,
        ));
        create_router(AppState {
            ingest,
            publisher,
            sizer,
            metrics: None,
            version: "test".to_string(),
        })
    }

    fn post_batch(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/executions/batch")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_breaker_state() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["circuitBreaker"], "CLOSED");
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let item = r#"{"status":"NEW","tradeType":"BUY","destination":"NYSE","securityId":"A","quantity":"1"}"#;
        let body = format!(r#"{{"executions":[{item},{item},{item}]}}"#);
        let response = router().oneshot(post_batch(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "BATCH_TOO_LARGE");
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_request() {
        let response = router().oneshot(post_batch("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_disabled_is_not_found() {
        let response = router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
