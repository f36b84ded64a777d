//! EvidenceForge Common Library
//!
//! Shared code for the EvidenceForge services including:
//! - The evidence engine (extraction, filtering, gating, synthesis)
//! - Search backend and language model abstractions
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod evidence;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod search;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use evidence::{EvidencePipeline, PipelineAnswer, RequestContextRegistry, SynthesisMode};
pub use llm::{create_language_model, LanguageModel};
pub use search::{create_search_gateway, SearchGateway};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
