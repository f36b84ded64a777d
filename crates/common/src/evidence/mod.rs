//! Evidence Engine
//!
//! The retrieval and grounding layer behind every answer:
//! - Entity extraction and synonym expansion
//! - Sentence-level co-mention filtering with domain gates
//! - Document deduplication and ranking
//! - Sufficiency gating
//! - Request contexts and grounded synthesis

mod dedup;
mod domain_gate;
mod entity_extractor;
mod pipeline;
mod request_context;
mod sentence_filter;
mod sufficiency;
mod synthesizer;
pub mod text;

pub use dedup::deduplicate;
pub use domain_gate::DomainGate;
pub use entity_extractor::{expand_term, EntityExtractor, ExtractedEntities};
pub use pipeline::{
    AnsweredQuery, EvidencePipeline, InsufficientAnswer, PipelineAnswer, PipelineOptions, RequestState,
    SynthesisReport,
};
pub use request_context::{
    Clock, ManualClock, NewRequestContext, RegistryStats, RequestContext, RequestContextRegistry, SystemClock,
};
pub use sentence_filter::{relation_cue_count, study_type_prior, SentenceEvidenceFilter};
pub use sufficiency::{InsufficiencyReason, InsufficientEvidence, SufficiencyGate, SufficiencyVerdict};
pub use synthesizer::{
    insufficient_message, insufficient_template, AnswerSynthesizer, CitationAudit, ModeSettings, RenderedEvidence,
    SynthesisMode, SynthesisOptions, SynthesisOutput, UNKNOWN_ANSWER,
};
