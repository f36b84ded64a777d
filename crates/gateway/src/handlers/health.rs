//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;
use evidenceforge_common::evidence::RegistryStats;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: ReadyChecks,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub search_backend: String,
    pub language_model: String,
    pub request_contexts: RegistryStats,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: evidenceforge_common::VERSION.to_string(),
    })
}

/// Readiness probe - reports the wired backends and registry occupancy
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let pipeline = &state.pipeline;

    Json(ReadyResponse {
        status: "ready".to_string(),
        checks: ReadyChecks {
            search_backend: pipeline.search_backend().to_string(),
            language_model: pipeline.model_name().to_string(),
            request_contexts: pipeline.registry().stats().await,
        },
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::router;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let response = router(Vec::new())
            .oneshot(Request::get("/v2/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_registry() {
        let response = router(Vec::new())
            .oneshot(Request::get("/v2/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["search_backend"], "static");
        assert_eq!(body["checks"]["request_contexts"]["active_contexts"], 0);
        assert_eq!(body["checks"]["request_contexts"]["ttl_secs"], 600);
    }
}
