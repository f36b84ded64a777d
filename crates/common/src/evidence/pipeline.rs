//! Evidence pipeline
//!
//! query -> entities -> candidates -> evidence sentences -> consolidated
//! documents -> sufficiency verdict -> request context -> synthesis.
//!
//! Only the search call and the two synthesis calls suspend; every stage in
//! between is synchronous.

use super::dedup::deduplicate;
use super::domain_gate::DomainGate;
use super::entity_extractor::{EntityExtractor, ExtractedEntities};
use super::request_context::{NewRequestContext, RequestContext, RequestContextRegistry};
use super::sentence_filter::{study_type_prior, SentenceEvidenceFilter};
use super::sufficiency::{InsufficiencyReason, InsufficientEvidence, SufficiencyGate, SufficiencyVerdict};
use super::synthesizer::{
    insufficient_message, insufficient_template, AnswerSynthesizer, CitationAudit, SynthesisMode,
    SynthesisOptions,
};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::llm::LanguageModel;
use crate::metrics;
use crate::models::{Citation, EvidenceChunk, Paper};
use crate::search::SearchGateway;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Retrieving,
    InsufficientEvidence,
    EvidenceReady,
    Synthesizing,
    Answered,
    SynthesisFailed,
}

/// Pipeline limits and timeouts
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub fetch_size: usize,
    pub max_citations: usize,
    pub search_timeout: Duration,
    pub synthesis_timeout: Duration,
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            fetch_size: config.search.fetch_size,
            max_citations: config.pipeline.max_citations,
            search_timeout: config.search_timeout(),
            synthesis_timeout: config.synthesis_timeout(),
        }
    }
}

/// Outcome of one synthesis mode; never an error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisReport {
    pub mode: SynthesisMode,
    pub text: String,
    pub latency_ms: u64,
    pub evidence_used_count: usize,
    pub state: RequestState,
    pub audit: CitationAudit,
    /// Cause of a degraded result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SynthesisReport {
    pub fn succeeded(&self) -> bool {
        self.state == RequestState::Answered
    }
}

/// Result of a request stopped by the sufficiency gate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsufficientAnswer {
    pub request_id: Uuid,
    pub query: String,
    pub is_compositional: bool,
    pub evidence_count: usize,
    pub reason: InsufficiencyReason,
    pub found: usize,
    pub required: usize,
    pub message: String,
    pub retrieval_latency_ms: u64,
}

/// Result of a request that reached synthesis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnsweredQuery {
    pub request_id: Uuid,
    pub query: String,
    pub is_compositional: bool,
    /// Consolidated documents that passed the gate, before the citation cap
    pub evidence_count: usize,
    /// Documents shown to the model; `[n]` in either text is `citations[n - 1]`
    pub citations: Vec<Citation>,
    pub summary: SynthesisReport,
    pub answer: SynthesisReport,
    pub retrieval_latency_ms: u64,
}

impl AnsweredQuery {
    /// Answered when at least one mode produced model output
    pub fn state(&self) -> RequestState {
        if self.summary.succeeded() || self.answer.succeeded() {
            RequestState::Answered
        } else {
            RequestState::SynthesisFailed
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineAnswer {
    Insufficient(InsufficientAnswer),
    Answered(AnsweredQuery),
}

impl PipelineAnswer {
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::Insufficient(a) => a.request_id,
            Self::Answered(a) => a.request_id,
        }
    }

    pub fn state(&self) -> RequestState {
        match self {
            Self::Insufficient(_) => RequestState::InsufficientEvidence,
            Self::Answered(a) => a.state(),
        }
    }
}

pub struct EvidencePipeline {
    extractor: EntityExtractor,
    filter: SentenceEvidenceFilter,
    gate: SufficiencyGate,
    search: Arc<dyn SearchGateway>,
    synthesizer: AnswerSynthesizer,
    registry: Arc<RequestContextRegistry>,
    options: PipelineOptions,
}

impl EvidencePipeline {
    pub fn new(
        config: &AppConfig,
        search: Arc<dyn SearchGateway>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let registry = Arc::new(RequestContextRegistry::new(config.context_ttl()));
        Self::with_registry(config, search, model, registry)
    }

    pub fn with_registry(
        config: &AppConfig,
        search: Arc<dyn SearchGateway>,
        model: Arc<dyn LanguageModel>,
        registry: Arc<RequestContextRegistry>,
    ) -> Result<Self> {
        let gates = DomainGate::from_configs(&config.pipeline.domain_gates)?;

        Ok(Self {
            extractor: EntityExtractor::new()?,
            filter: SentenceEvidenceFilter::new(gates),
            gate: SufficiencyGate::from(&config.pipeline),
            search,
            synthesizer: AnswerSynthesizer::new(model, SynthesisOptions::from(&config.pipeline))?,
            registry,
            options: PipelineOptions::from(config),
        })
    }

    /// Override the stage timeouts
    pub fn with_timeouts(mut self, search: Duration, synthesis: Duration) -> Self {
        self.options.search_timeout = search;
        self.options.synthesis_timeout = synthesis;
        self
    }

    pub fn registry(&self) -> &Arc<RequestContextRegistry> {
        &self.registry
    }

    pub fn search_backend(&self) -> &str {
        self.search.name()
    }

    pub fn model_name(&self) -> &str {
        self.synthesizer.model_name()
    }

    /// Retrieve, filter and gate evidence, then store the request context.
    ///
    /// A backend failure or timeout is an error and stores nothing. Thin
    /// evidence is not an error: the stored context is flagged insufficient.
    pub async fn retrieve(&self, query: &str) -> Result<Arc<RequestContext>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "Query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let start = Instant::now();
        let entities = self.extractor.extract(query);
        tracing::debug!(
            compositional = entities.is_compositional,
            pattern = ?entities.matched_pattern,
            x_terms = ?entities.x_terms,
            y_terms = ?entities.y_terms,
            "Query parsed"
        );

        let papers = self.fetch_candidates(query).await.inspect_err(|e| {
            metrics::record_retrieval_failure(&e.code().as_code().to_string());
        })?;

        let (verdict, evidence_count) = self.select_evidence(&entities, &papers);
        let retrieval_latency_ms = start.elapsed().as_millis() as u64;

        let (selected_evidence, insufficiency) = match verdict {
            SufficiencyVerdict::Sufficient(mut entries) => {
                entries.truncate(self.options.max_citations);
                (entries, None)
            }
            SufficiencyVerdict::Insufficient(info) => {
                metrics::record_insufficient(info.reason.as_str());
                tracing::info!(
                    reason = %info.reason,
                    found = info.found,
                    required = info.required,
                    evidence_count = info.evidence_count,
                    "Insufficient evidence"
                );
                (Vec::new(), Some(info))
            }
        };

        metrics::record_retrieval(
            start.elapsed().as_secs_f64(),
            papers.len(),
            evidence_count,
            entities.is_compositional,
        );

        tracing::info!(
            candidates = papers.len(),
            evidence_count,
            selected = selected_evidence.len(),
            compositional = entities.is_compositional,
            x_terms = ?entities.x_terms,
            y_terms = ?entities.y_terms,
            retrieval_latency_ms,
            "Evidence retrieval complete"
        );

        let context = self
            .registry
            .create(NewRequestContext {
                query: query.to_string(),
                entities,
                selected_evidence,
                retrieval_latency_ms,
                evidence_count,
                insufficiency,
            })
            .await;

        Ok(context)
    }

    async fn fetch_candidates(&self, query: &str) -> Result<Vec<Paper>> {
        let timeout = self.options.search_timeout;
        let papers = tokio::time::timeout(timeout, self.search.search(query, self.options.fetch_size))
            .await
            .map_err(|_| AppError::SearchTimeout { timeout_ms: timeout.as_millis() as u64 })??;

        tracing::debug!(backend = self.search.name(), candidates = papers.len(), "Candidates fetched");
        Ok(papers)
    }

    /// Turn candidates into a sufficiency verdict.
    ///
    /// Returns the verdict together with the number of consolidated entries
    /// that reached the gate.
    pub fn select_evidence(&self, entities: &ExtractedEntities, papers: &[Paper]) -> (SufficiencyVerdict, usize) {
        let chunks = if entities.is_compositional {
            self.filter.filter(entities, papers)
        } else {
            // Single-topic queries rank whole papers; there is no relation to validate
            papers
                .iter()
                .enumerate()
                .map(|(position, paper)| {
                    let prior = study_type_prior(&paper.full_text());
                    EvidenceChunk::new((position + 1).to_string(), paper.clone(), Vec::new(), prior)
                })
                .collect()
        };

        let entries = deduplicate(chunks);
        let evidence_count = entries.len();
        tracing::debug!(evidence_count, "Evidence consolidated");

        (self.gate.evaluate(entries, entities.is_compositional), evidence_count)
    }

    /// Re-run one synthesis mode against a stored context
    pub async fn synthesize(&self, request_id: Uuid, mode: SynthesisMode) -> Result<SynthesisReport> {
        let context = self.registry.get(request_id).await?;
        Ok(self.run_synthesis(&context, mode).await)
    }

    /// Answer a query end to end.
    ///
    /// Summary and detailed synthesis run concurrently; a failure in one
    /// degrades only that one to the insufficient-evidence template.
    pub async fn answer(&self, query: &str) -> Result<PipelineAnswer> {
        let context = self.retrieve(query).await?;

        if let Some(info) = &context.insufficiency {
            return Ok(PipelineAnswer::Insufficient(insufficient_answer(&context, info)));
        }

        let (summary, answer) = tokio::join!(
            self.run_synthesis(&context, SynthesisMode::Summary),
            self.run_synthesis(&context, SynthesisMode::Detailed),
        );

        // Inline [n] markers index this list, so it stops where rendering stopped
        let rendered = self
            .synthesizer
            .render_evidence(&context.selected_evidence, context.entities.is_compositional)
            .len();

        let answered = AnsweredQuery {
            request_id: context.request_id,
            query: context.query.clone(),
            is_compositional: context.entities.is_compositional,
            evidence_count: context.evidence_count,
            citations: context.selected_evidence.iter().take(rendered).map(Citation::from).collect(),
            summary,
            answer,
            retrieval_latency_ms: context.retrieval_latency_ms,
        };

        tracing::info!(
            request_id = %answered.request_id,
            state = ?answered.state(),
            citations = answered.citations.len(),
            summary_latency_ms = answered.summary.latency_ms,
            answer_latency_ms = answered.answer.latency_ms,
            "Query answered"
        );

        Ok(PipelineAnswer::Answered(answered))
    }

    async fn run_synthesis(&self, context: &RequestContext, mode: SynthesisMode) -> SynthesisReport {
        let start = Instant::now();
        let timeout = self.options.synthesis_timeout;
        let result = tokio::time::timeout(timeout, self.synthesizer.synthesize(context, mode))
            .await
            .unwrap_or_else(|_| Err(AppError::LanguageModelTimeout { timeout_ms: timeout.as_millis() as u64 }));

        match result {
            Ok(output) => {
                // No evidence rendered means the template came back without a model call
                let state = if context.insufficient_evidence || output.evidence_used_count == 0 {
                    RequestState::InsufficientEvidence
                } else {
                    metrics::record_synthesis(mode.as_str(), start.elapsed().as_secs_f64(), true);
                    RequestState::Answered
                };
                SynthesisReport {
                    mode,
                    text: output.text,
                    latency_ms: output.latency_ms,
                    evidence_used_count: output.evidence_used_count,
                    state,
                    audit: output.audit,
                    error: None,
                }
            }
            Err(e) => {
                metrics::record_synthesis(mode.as_str(), start.elapsed().as_secs_f64(), false);
                tracing::warn!(
                    request_id = %context.request_id,
                    mode = %mode,
                    error = %e,
                    "Synthesis failed, returning template"
                );
                SynthesisReport {
                    mode,
                    text: insufficient_template(context.evidence_count, mode, context.entities.is_compositional),
                    latency_ms: start.elapsed().as_millis() as u64,
                    evidence_used_count: 0,
                    state: RequestState::SynthesisFailed,
                    audit: CitationAudit::default(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

fn insufficient_answer(context: &RequestContext, info: &InsufficientEvidence) -> InsufficientAnswer {
    InsufficientAnswer {
        request_id: context.request_id,
        query: context.query.clone(),
        is_compositional: context.entities.is_compositional,
        evidence_count: info.evidence_count,
        reason: info.reason,
        found: info.found,
        required: info.required,
        message: insufficient_message(info.evidence_count, context.entities.is_compositional),
        retrieval_latency_ms: context.retrieval_latency_ms,
    }
}
