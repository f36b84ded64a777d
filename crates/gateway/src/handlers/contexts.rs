//! Request context handlers
//!
//! Stored contexts can be inspected and re-synthesized until they expire.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use evidenceforge_common::{
    errors::{AppError, Result},
    evidence::{InsufficientEvidence, SynthesisReport},
    models::Citation,
    SynthesisMode,
};

/// Summary of a stored context
#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub request_id: Uuid,
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub retrieval_latency_ms: u64,
    pub is_compositional: bool,
    pub insufficient_evidence: bool,
    pub evidence_count: usize,
    pub x_terms: Vec<String>,
    pub y_terms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insufficiency: Option<InsufficientEvidence>,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    #[serde(default = "default_mode")]
    pub mode: SynthesisMode,
}

fn default_mode() -> SynthesisMode {
    SynthesisMode::Summary
}

#[derive(Debug, Serialize)]
pub struct SynthesizeResponse {
    pub success: bool,
    pub request_id: Uuid,
    #[serde(flatten)]
    pub report: SynthesisReport,
}

/// Inspect a stored request context
pub async fn get_context(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ContextResponse>> {
    let context = state.pipeline.registry().get_str(&request_id).await?;

    Ok(Json(ContextResponse {
        request_id: context.request_id,
        query: context.query.clone(),
        created_at: context.created_at,
        retrieval_latency_ms: context.retrieval_latency_ms,
        is_compositional: context.entities.is_compositional,
        insufficient_evidence: context.insufficient_evidence,
        evidence_count: context.evidence_count,
        x_terms: context.entities.x_terms.clone(),
        y_terms: context.entities.y_terms.clone(),
        insufficiency: context.insufficiency.clone(),
        citations: context.selected_evidence.iter().map(Citation::from).collect(),
    }))
}

/// Re-run one synthesis mode against the stored evidence
pub async fn synthesize(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    payload: std::result::Result<Json<SynthesizeRequest>, JsonRejection>,
) -> Result<Json<SynthesizeResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    let id = Uuid::parse_str(request_id.trim()).map_err(|_| AppError::ContextNotFound {
        id: request_id.clone(),
    })?;

    let report = state.pipeline.synthesize(id, request.mode).await?;
    tracing::info!(request_id = %id, mode = %request.mode, state = ?report.state, "Context re-synthesized");

    Ok(Json(SynthesizeResponse {
        success: true,
        request_id: id,
        report,
    }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{broad_hits, router};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_context_is_not_found() {
        let app = router(broad_hits());
        let uri = format!("/v2/contexts/{}", uuid::Uuid::new_v4());
        let (status, body) = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "CONTEXT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_error_responses_carry_request_id() {
        let app = router(broad_hits());
        let uri = format!("/v2/contexts/{}", uuid::Uuid::new_v4());

        let response = app
            .clone()
            .oneshot(Request::get(&uri).header("x-request-id", "trace-42").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-request-id"], "trace-42");

        let response = app.oneshot(Request::get(&uri).body(Body::empty()).unwrap()).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("request_id").is_none());
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found() {
        let app = router(broad_hits());
        let (status, body) = send(&app, json_post("/v2/contexts/not-a-uuid/synthesize", "{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "CONTEXT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_inspect_and_resynthesize_after_answer() {
        let app = router(broad_hits());
        let (status, answered) = send(
            &app,
            json_post("/v2/answer", r#"{"query": "effect of microplastics on kidney function"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let request_id = answered["request_id"].as_str().unwrap().to_string();

        let (status, context) = send(
            &app,
            Request::get(format!("/v2/contexts/{request_id}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(context["request_id"], request_id.as_str());
        assert_eq!(context["is_compositional"], true);
        assert_eq!(context["insufficient_evidence"], false);
        assert_eq!(context["citations"].as_array().unwrap().len(), 12);
        assert!(context.get("insufficiency").is_none());

        let (status, report) = send(
            &app,
            json_post(&format!("/v2/contexts/{request_id}/synthesize"), r#"{"mode": "answer"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["success"], true);
        assert_eq!(report["mode"], "detailed");
        assert_eq!(report["state"], "ANSWERED");
    }
}
