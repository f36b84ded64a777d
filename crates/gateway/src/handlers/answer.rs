//! Answer handler

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use evidenceforge_common::{
    errors::{AppError, Result},
    evidence::{insufficient_template, AnsweredQuery, InsufficientAnswer, RequestState, SynthesisReport},
    models::Citation,
    PipelineAnswer, SynthesisMode,
};

/// Answer request
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(length(max = 2000))]
    pub query: Option<String>,

    /// Free-form label echoed back to the client
    #[serde(default)]
    pub query_type: Option<String>,
}

fn default_query_type() -> String {
    "general".to_string()
}

/// Answer response, shared by the answered and insufficient outcomes
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub query: String,
    pub query_type: String,
    pub insufficient_evidence: bool,
    pub evidence_count: usize,
    pub citations: Vec<Citation>,
    pub summary: String,
    pub answer: String,
    pub retrieval_latency_ms: u64,
    pub summary_latency_ms: u64,
    pub answer_latency_ms: u64,
    pub summary_status: RequestState,
    pub answer_status: RequestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Answer a biomedical question with grounded citations
pub async fn answer(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("query".to_string()),
    })?;

    let query = request.query.ok_or_else(|| AppError::MissingField {
        field: "query".to_string(),
    })?;
    if query.trim().is_empty() {
        return Err(AppError::Validation {
            message: "Query must not be empty".to_string(),
            field: Some("query".to_string()),
        });
    }

    let query_type = request
        .query_type
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(default_query_type);

    tracing::info!(query = %query, query_type = %query_type, "Answer request");

    let response = match state.pipeline.answer(&query).await? {
        PipelineAnswer::Answered(answered) => answered_response(answered, query_type),
        PipelineAnswer::Insufficient(insufficient) => insufficient_response(insufficient, query_type),
    };

    Ok(Json(response))
}

fn answered_response(answered: AnsweredQuery, query_type: String) -> AnswerResponse {
    let AnsweredQuery {
        request_id,
        query,
        evidence_count,
        citations,
        summary,
        answer,
        retrieval_latency_ms,
        ..
    } = answered;
    let SynthesisReport { text: summary_text, latency_ms: summary_latency_ms, state: summary_status, .. } = summary;
    let SynthesisReport { text: answer_text, latency_ms: answer_latency_ms, state: answer_status, .. } = answer;

    AnswerResponse {
        success: true,
        request_id,
        query,
        query_type,
        insufficient_evidence: false,
        evidence_count,
        citations,
        summary: summary_text,
        answer: answer_text,
        retrieval_latency_ms,
        summary_latency_ms,
        answer_latency_ms,
        summary_status,
        answer_status,
        required: None,
        found: None,
        reason: None,
        message: None,
    }
}

fn insufficient_response(insufficient: InsufficientAnswer, query_type: String) -> AnswerResponse {
    let count = insufficient.evidence_count;
    let compositional = insufficient.is_compositional;

    AnswerResponse {
        success: true,
        request_id: insufficient.request_id,
        query: insufficient.query,
        query_type,
        insufficient_evidence: true,
        evidence_count: count,
        citations: Vec::new(),
        summary: insufficient_template(count, SynthesisMode::Summary, compositional),
        answer: insufficient_template(count, SynthesisMode::Detailed, compositional),
        retrieval_latency_ms: insufficient.retrieval_latency_ms,
        summary_latency_ms: 0,
        answer_latency_ms: 0,
        summary_status: RequestState::InsufficientEvidence,
        answer_status: RequestState::InsufficientEvidence,
        required: Some(insufficient.required),
        found: Some(insufficient.found),
        reason: Some(insufficient.reason.to_string()),
        message: Some(insufficient.message),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{broad_hits, hit, router, router_from};
    use evidenceforge_common::{search::StaticSearchGateway, AppConfig};
    use std::sync::Arc;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    async fn post_answer(app: axum::Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::post("/v2/answer")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (status, body) = post_answer(router(broad_hits()), r#"{"query": "   "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_missing_query_rejected() {
        let (status, body) = post_answer(router(broad_hits()), r#"{"query_type": "general"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let (status, body) = post_answer(router(broad_hits()), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_FORMAT");
    }

    #[tokio::test]
    async fn test_overlong_query_rejected() {
        let long = "a".repeat(2001);
        let (status, body) = post_answer(router(broad_hits()), &format!(r#"{{"query": "{long}"}}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_answered_with_capped_citations() {
        let (status, body) = post_answer(
            router(broad_hits()),
            r#"{"query": "effect of microplastics on kidney function"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["insufficient_evidence"], false);
        assert_eq!(body["query_type"], "general");
        assert_eq!(body["evidence_count"], 12);
        // Ten rendered documents; [n] resolves to citations[n - 1]
        assert_eq!(body["citations"].as_array().unwrap().len(), 10);
        assert_eq!(body["citations"][0]["identifier"], "1000");
        assert_eq!(body["summary_status"], "ANSWERED");
        assert_eq!(body["answer_status"], "ANSWERED");
        assert!(body["summary"].as_str().unwrap().contains("[1]"));
        assert!(body["citations"][0]["url"].as_str().unwrap().starts_with("https://pubmed"));
        assert!(body.get("required").is_none());
    }

    #[tokio::test]
    async fn test_insufficient_evidence_is_success() {
        let hits = vec![
            hit(1, "Microplastic particles were found in seawater."),
            hit(2, "Kidney function declined with age."),
        ];
        let (status, body) = post_answer(
            router(hits),
            r#"{"query": "effect of microplastics on kidney function", "query_type": "research"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["insufficient_evidence"], true);
        assert_eq!(body["query_type"], "research");
        assert_eq!(body["evidence_count"], 0);
        assert_eq!(body["required"], 6);
        assert_eq!(body["reason"], "too_few_chunks");
        assert!(body["citations"].as_array().unwrap().is_empty());
        assert!(body["message"].as_str().unwrap().starts_with("Insufficient evidence: found 0"));
        assert_eq!(body["summary_status"], "INSUFFICIENT_EVIDENCE");
    }

    #[tokio::test]
    async fn test_backend_failure_is_bad_gateway() {
        let search = Arc::new(StaticSearchGateway::failing("connection refused"));
        let app = router_from(search.clone(), AppConfig::default());

        let (status, body) = post_answer(app, r#"{"query": "caffeine vs sleep"}"#).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "SEARCH_BACKEND_ERROR");
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_query_makes_no_backend_call() {
        let search = Arc::new(StaticSearchGateway::new(broad_hits()));
        let app = router_from(search.clone(), AppConfig::default());

        let (status, _) = post_answer(app, r#"{"query": ""}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(search.call_count(), 0);
    }
}
