//! Configuration management for EvidenceForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Search backend configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval, evidence and synthesis thresholds
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Request context registry configuration
    #[serde(default)]
    pub request_context: RequestContextConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whole-request timeout in seconds; must exceed the search and synthesis
    /// timeouts combined so a slow stage degrades instead of being cut off
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Time allowed for in-flight requests to drain after a shutdown signal
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Search provider: http, mock
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// Base URL of the search endpoint (GET ?q=&size=)
    pub base_url: Option<String>,

    /// Number of candidates requested per query
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Retries after a rate-limit response
    #[serde(default = "default_llm_rate_limit_retries")]
    pub rate_limit_retries: u32,

    /// Initial backoff before a retry, in milliseconds
    #[serde(default = "default_llm_backoff")]
    pub initial_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Maximum consolidated documents handed to synthesis and returned as citations
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,

    /// Minimum consolidated entries
    #[serde(default = "default_min_chunks")]
    pub min_chunks: usize,

    /// Minimum distinct documents
    #[serde(default = "default_min_documents")]
    pub min_documents: usize,

    /// Minimum evidence sentences (compositional queries only)
    #[serde(default = "default_min_evidence_sentences")]
    pub min_evidence_sentences: usize,

    /// Evidence sentences rendered into a prompt
    #[serde(default = "default_max_prompt_sentences")]
    pub max_prompt_sentences: usize,

    /// Evidence sentences rendered per document
    #[serde(default = "default_max_sentences_per_document")]
    pub max_sentences_per_document: usize,

    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,

    #[serde(default = "default_detailed_temperature")]
    pub detailed_temperature: f32,

    #[serde(default = "default_detailed_max_tokens")]
    pub detailed_max_tokens: usize,

    /// Per-call synthesis timeout in seconds
    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_secs: u64,

    /// Domain evidence gates applied after co-mention
    #[serde(default = "default_domain_gates")]
    pub domain_gates: Vec<DomainGateConfig>,
}

/// A domain-specific evidence gate.
///
/// The gate applies when any trigger term is among the query's X-side terms.
/// A sentence must then match one of `required_patterns` and none of
/// `excluded_patterns`, except for excluded patterns that also match the
/// query itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainGateConfig {
    pub name: String,
    pub trigger_terms: Vec<String>,
    pub required_patterns: Vec<String>,
    #[serde(default)]
    pub excluded_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestContextConfig {
    /// Maximum age of a stored context in seconds
    #[serde(default = "default_context_ttl")]
    pub ttl_secs: u64,

    /// Interval between background sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 45 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_search_provider() -> String { "http".to_string() }
fn default_fetch_size() -> usize { 200 }
fn default_search_timeout() -> u64 { 10 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 20 }
fn default_llm_rate_limit_retries() -> u32 { 0 }
fn default_llm_backoff() -> u64 { 500 }
fn default_max_citations() -> usize { 12 }
fn default_min_chunks() -> usize { 6 }
fn default_min_documents() -> usize { 3 }
fn default_min_evidence_sentences() -> usize { 3 }
fn default_max_prompt_sentences() -> usize { 10 }
fn default_max_sentences_per_document() -> usize { 3 }
fn default_summary_temperature() -> f32 { 0.3 }
fn default_summary_max_tokens() -> usize { 300 }
fn default_detailed_temperature() -> f32 { 0.2 }
fn default_detailed_max_tokens() -> usize { 800 }
fn default_synthesis_timeout() -> u64 { 25 }
fn default_context_ttl() -> u64 { 600 }
fn default_sweep_interval() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

/// The neuroinflammation gate: cytokines, glial activation and canonical
/// pathways are required; organ-specific "inflammatory" diseases are excluded.
pub fn default_domain_gates() -> Vec<DomainGateConfig> {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    vec![DomainGateConfig {
        name: "neuroinflammation".to_string(),
        trigger_terms: strings(&["inflammation", "inflammatory", "neuroinflammation"]),
        required_patterns: strings(&[
            r"\b(?:neuro)?inflammation\b",
            r"\bglial activation\b",
            r"\bmicroglia(?:l)? activation\b",
            r"\bastrocyte activation\b",
            r"\bastrogliosis\b",
            r"\bcytokines?\b",
            r"\binterleukin",
            r"\btnf-?(?:α|alpha)",
            r"\bil-1(?:β|beta)",
            r"\bil-6\b",
            r"\bcrp\b",
            r"\bnf-(?:κb|kappa ?b)",
            r"\bnlrp3\b",
        ]),
        excluded_patterns: strings(&[
            r"\binflammatory bowel disease\b",
            r"\binflammatory myopathy\b",
            r"\binflammatory arthritis\b",
            r"\binflammatory neuropathy\b",
            r"\binflammatory cardiomyopathy\b",
        ]),
    }]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            base_url: None,
            fetch_size: default_fetch_size(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            rate_limit_retries: default_llm_rate_limit_retries(),
            initial_backoff_ms: default_llm_backoff(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_citations: default_max_citations(),
            min_chunks: default_min_chunks(),
            min_documents: default_min_documents(),
            min_evidence_sentences: default_min_evidence_sentences(),
            max_prompt_sentences: default_max_prompt_sentences(),
            max_sentences_per_document: default_max_sentences_per_document(),
            summary_temperature: default_summary_temperature(),
            summary_max_tokens: default_summary_max_tokens(),
            detailed_temperature: default_detailed_temperature(),
            detailed_max_tokens: default_detailed_max_tokens(),
            synthesis_timeout_secs: default_synthesis_timeout(),
            domain_gates: default_domain_gates(),
        }
    }
}

impl Default for RequestContextConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_context_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__PIPELINE__MIN_DOCUMENTS=4
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search.timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.synthesis_timeout_secs)
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.request_context.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.request_context.sweep_interval_secs)
    }
}
