//! Search gateway abstraction
//!
//! The pipeline only ever sees normalized [`Paper`] records; backend field
//! naming differences are absorbed here.

use crate::config::SearchConfig;
use crate::errors::{AppError, Result};
use crate::models::{Paper, SearchHit};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Trait for candidate retrieval
#[async_trait]
pub trait SearchGateway: Send + Sync {
    /// Return up to `size` candidates, best first
    async fn search(&self, query: &str, size: usize) -> Result<Vec<Paper>>;

    /// Backend name for logs and metrics
    fn name(&self) -> &str;
}

/// Backend responses either wrap hits in an object or return a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped {
        #[serde(alias = "results")]
        hits: Vec<SearchHit>,
    },
    Bare(Vec<SearchHit>),
}

impl SearchResponse {
    fn into_hits(self) -> Vec<SearchHit> {
        match self {
            Self::Wrapped { hits } => hits,
            Self::Bare(hits) => hits,
        }
    }
}

/// Normalize raw hits, keeping backend order
pub fn normalize_hits(hits: Vec<SearchHit>, size: usize) -> Vec<Paper> {
    hits.into_iter()
        .take(size)
        .enumerate()
        .map(|(position, hit)| Paper::from_hit(hit, position))
        .collect()
}

/// HTTP search backend (GET `base_url?q=...&size=...`)
pub struct HttpSearchGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSearchGateway {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, base_url, timeout })
    }
}

#[async_trait]
impl SearchGateway for HttpSearchGateway {
    async fn search(&self, query: &str, size: usize) -> Result<Vec<Paper>> {
        let size_param = size.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("size", size_param.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::SearchTimeout { timeout_ms: self.timeout.as_millis() as u64 }
                } else {
                    AppError::SearchBackend { message: format!("Request failed: {}", e) }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SearchBackend {
                message: format!("Backend error {}: {}", status, body),
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| AppError::SearchBackend {
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(normalize_hits(parsed.into_hits(), size))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// In-memory backend returning a fixed hit list
pub struct StaticSearchGateway {
    hits: Vec<SearchHit>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticSearchGateway {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Fail every search with a backend error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::empty()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchGateway for StaticSearchGateway {
    async fn search(&self, _query: &str, size: usize) -> Result<Vec<Paper>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(AppError::SearchBackend { message: message.clone() });
        }
        Ok(normalize_hits(self.hits.clone(), size))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Create a search gateway based on configuration
pub fn create_search_gateway(config: &SearchConfig) -> Result<Arc<dyn SearchGateway>> {
    match config.provider.as_str() {
        "http" => {
            let base_url = config
                .base_url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "search.base_url is required for the http provider".to_string(),
                })?;
            Ok(Arc::new(HttpSearchGateway::new(
                base_url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" | "static" => {
            tracing::warn!("Using empty static search backend");
            Ok(Arc::new(StaticSearchGateway::empty()))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown search provider: {}", other),
        }),
    }
}
