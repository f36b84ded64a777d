//! Request context registry
//!
//! Every answered query leaves behind an immutable snapshot of its extracted
//! entities and selected evidence. Synthesis reads only from that snapshot,
//! so follow-up calls with the same request id see exactly what the original
//! request saw. Snapshots expire after a fixed TTL.

use super::entity_extractor::ExtractedEntities;
use super::sufficiency::InsufficientEvidence;
use crate::errors::{AppError, Result};
use crate::models::ConsolidatedEvidence;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += ChronoDuration::from_std(by).unwrap_or(ChronoDuration::MAX);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Immutable snapshot of one request's retrieval results
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub query: String,
    pub entities: ExtractedEntities,
    /// Evidence in ranked order; empty when evidence was insufficient
    pub selected_evidence: Vec<ConsolidatedEvidence>,
    pub created_at: DateTime<Utc>,
    pub retrieval_latency_ms: u64,
    pub insufficient_evidence: bool,
    /// Entries that survived filtering, before any cap
    pub evidence_count: usize,
    pub insufficiency: Option<InsufficientEvidence>,
}

/// Everything needed to register a new context
#[derive(Debug, Clone)]
pub struct NewRequestContext {
    pub query: String,
    pub entities: ExtractedEntities,
    pub selected_evidence: Vec<ConsolidatedEvidence>,
    pub retrieval_latency_ms: u64,
    pub evidence_count: usize,
    pub insufficiency: Option<InsufficientEvidence>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub active_contexts: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub ttl_secs: u64,
}

/// Registry of request contexts keyed by request id
pub struct RequestContextRegistry {
    contexts: RwLock<HashMap<Uuid, Arc<RequestContext>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RequestContextRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Store a snapshot under a fresh request id
    pub async fn create(&self, new: NewRequestContext) -> Arc<RequestContext> {
        let context = Arc::new(RequestContext {
            request_id: Uuid::new_v4(),
            query: new.query,
            entities: new.entities,
            selected_evidence: new.selected_evidence,
            created_at: self.clock.now(),
            retrieval_latency_ms: new.retrieval_latency_ms,
            insufficient_evidence: new.insufficiency.is_some(),
            evidence_count: new.evidence_count,
            insufficiency: new.insufficiency,
        });

        self.contexts
            .write()
            .await
            .insert(context.request_id, Arc::clone(&context));

        tracing::debug!(request_id = %context.request_id, "Request context stored");
        context
    }

    /// Look up a live context.
    ///
    /// Expired contexts are reported as not found even before the sweeper
    /// removes them.
    pub async fn get(&self, request_id: Uuid) -> Result<Arc<RequestContext>> {
        let context = self
            .contexts
            .read()
            .await
            .get(&request_id)
            .cloned()
            .ok_or_else(|| AppError::ContextNotFound { id: request_id.to_string() })?;

        if self.is_expired(&context) {
            return Err(AppError::ContextNotFound { id: request_id.to_string() });
        }
        Ok(context)
    }

    /// Look up a context by its textual id
    pub async fn get_str(&self, request_id: &str) -> Result<Arc<RequestContext>> {
        let id = Uuid::parse_str(request_id.trim())
            .map_err(|_| AppError::ContextNotFound { id: request_id.to_string() })?;
        self.get(id).await
    }

    /// Remove every expired context, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        let now = self.clock.now();
        let ttl = self.ttl_chrono();
        contexts.retain(|_, ctx| now - ctx.created_at < ttl);
        before - contexts.len()
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }

    pub async fn stats(&self) -> RegistryStats {
        let contexts = self.contexts.read().await;
        RegistryStats {
            active_contexts: contexts.len(),
            oldest: contexts.values().map(|c| c.created_at).min(),
            newest: contexts.values().map(|c| c.created_at).max(),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Purge expired contexts every `interval` until the task is aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.purge_expired().await;
                let active = self.len().await;
                crate::metrics::record_registry_size(active);
                if removed > 0 {
                    tracing::info!(removed, active, "Purged expired request contexts");
                }
            }
        })
    }

    fn is_expired(&self, context: &RequestContext) -> bool {
        self.clock.now() - context.created_at >= self.ttl_chrono()
    }

    fn ttl_chrono(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX)
    }
}
