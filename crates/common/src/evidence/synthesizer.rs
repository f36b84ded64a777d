//! Answer Synthesizer - Generates cited answers from validated evidence
//!
//! Provides:
//! - Evidence rendering with [1]..[n] numbering
//! - Grounding instructions for compositional queries
//! - Citation auditing against the rendered numbering
//! - Insufficient-evidence templates

use super::request_context::RequestContext;
use crate::config::PipelineConfig;
use crate::errors::{AppError, Result};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::models::{truncate_chars, ConsolidatedEvidence};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Fallback for claims the evidence does not support
pub const UNKNOWN_ANSWER: &str = "Unknown based on provided sources.";

/// Characters of abstract shown per single-entity passage
const PASSAGE_CHARS: usize = 600;

/// Synthesis style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    /// Short overview
    Summary,
    /// Full analysis, returned to clients as "answer"
    #[serde(alias = "answer")]
    Detailed,
}

impl SynthesisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Detailed => "detailed",
        }
    }

    /// Word used for this mode in user-facing text
    fn noun(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Detailed => "answer",
        }
    }
}

impl fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling settings for one mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeSettings {
    pub temperature: f32,
    pub max_output_tokens: usize,
}

/// Synthesizer options
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub summary: ModeSettings,
    pub detailed: ModeSettings,
    /// Evidence sentences rendered into one prompt
    pub max_prompt_sentences: usize,
    /// Evidence sentences rendered per document
    pub max_sentences_per_document: usize,
}

impl SynthesisOptions {
    pub fn settings(&self, mode: SynthesisMode) -> ModeSettings {
        match mode {
            SynthesisMode::Summary => self.summary,
            SynthesisMode::Detailed => self.detailed,
        }
    }
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for SynthesisOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            summary: ModeSettings {
                temperature: config.summary_temperature,
                max_output_tokens: config.summary_max_tokens,
            },
            detailed: ModeSettings {
                temperature: config.detailed_temperature,
                max_output_tokens: config.detailed_max_tokens,
            },
            max_prompt_sentences: config.max_prompt_sentences,
            max_sentences_per_document: config.max_sentences_per_document,
        }
    }
}

/// Evidence block as shown to the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedEvidence {
    pub text: String,
    /// Document id behind each number; entry `i` is citation `[i + 1]`
    pub references: Vec<String>,
}

impl RenderedEvidence {
    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Bracketed citations found in generated text
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CitationAudit {
    /// Valid citation numbers, ascending
    pub cited: Vec<usize>,
    /// Numbers outside the rendered range, ascending
    pub unsupported: Vec<usize>,
    /// Documents behind the valid citations, in citation order
    pub cited_documents: Vec<String>,
}

/// Result of one synthesis call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisOutput {
    pub text: String,
    pub latency_ms: u64,
    pub evidence_used_count: usize,
    pub audit: CitationAudit,
}

/// Synthesizer for generating answers
pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
    options: SynthesisOptions,
    citation_pattern: Regex,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, options: SynthesisOptions) -> Result<Self> {
        let citation_pattern = Regex::new(r"\[(\d+)\]").map_err(|e| AppError::Internal {
            message: format!("Invalid citation pattern: {}", e),
        })?;
        Ok(Self { model, options, citation_pattern })
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Synthesize one mode from a stored context.
    ///
    /// Insufficient contexts (and contexts with nothing to render) return the
    /// insufficient-evidence template without calling the model. Model
    /// errors are returned to the caller, which decides how to degrade.
    pub async fn synthesize(&self, context: &RequestContext, mode: SynthesisMode) -> Result<SynthesisOutput> {
        let evidence = self.render_evidence(&context.selected_evidence, context.entities.is_compositional);

        if context.insufficient_evidence || evidence.is_empty() {
            return Ok(SynthesisOutput {
                text: insufficient_template(context.evidence_count, mode, context.entities.is_compositional),
                latency_ms: 0,
                evidence_used_count: 0,
                audit: CitationAudit::default(),
            });
        }

        let settings = self.options.settings(mode);
        let request = CompletionRequest {
            system_prompt: system_prompt(context),
            user_prompt: user_prompt(context, mode, &evidence),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        };

        let start = Instant::now();
        let text = self.model.complete(request).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let audit = self.audit_citations(&text, &evidence);
        if !audit.unsupported.is_empty() {
            tracing::warn!(
                request_id = %context.request_id,
                mode = %mode,
                unsupported = ?audit.unsupported,
                rendered = evidence.len(),
                "Answer cites evidence that was not provided"
            );
        }

        tracing::debug!(
            request_id = %context.request_id,
            mode = %mode,
            latency_ms,
            evidence_used = evidence.len(),
            cited = audit.cited.len(),
            "Synthesis complete"
        );

        Ok(SynthesisOutput {
            text,
            latency_ms,
            evidence_used_count: evidence.len(),
            audit,
        })
    }

    /// Number the evidence in ranked order, one number per document.
    ///
    /// Number `n` always names the `n`-th entry of `evidence`, so rendered
    /// documents are a prefix of it. Compositional requests list up to
    /// `max_sentences_per_document` validated sentences under each number and
    /// stop once `max_prompt_sentences` sentences are shown. Single-entity
    /// requests render one title-and-excerpt passage per document.
    pub fn render_evidence(&self, evidence: &[ConsolidatedEvidence], is_compositional: bool) -> RenderedEvidence {
        let limit = self.options.max_prompt_sentences;
        let mut rendered = RenderedEvidence::default();
        let mut blocks = Vec::new();
        let mut shown = 0usize;

        for entry in evidence {
            if shown >= limit {
                break;
            }
            let number = rendered.references.len() + 1;

            if is_compositional {
                let room = self.options.max_sentences_per_document.min(limit - shown);
                let sentences: Vec<&str> = entry
                    .evidence_sentences
                    .iter()
                    .take(room)
                    .map(|s| s.text.as_str())
                    .collect();
                if sentences.is_empty() {
                    break;
                }
                shown += sentences.len();
                blocks.push(format!("[{}] {}", number, sentences.join(" ")));
            } else {
                shown += 1;
                let excerpt = truncate_chars(&entry.paper.abstract_text, PASSAGE_CHARS);
                blocks.push(format!("[{}] {}\n{}", number, entry.paper.title, excerpt));
            }
            rendered.references.push(entry.doc_id.clone());
        }

        rendered.text = blocks.join("\n");
        rendered
    }

    /// Compare the bracketed citations in `text` with the rendered numbering
    pub fn audit_citations(&self, text: &str, evidence: &RenderedEvidence) -> CitationAudit {
        let mut cited = BTreeSet::new();
        let mut unsupported = BTreeSet::new();

        for caps in self.citation_pattern.captures_iter(text) {
            let Some(Ok(number)) = caps.get(1).map(|m| m.as_str().parse::<usize>()) else {
                continue;
            };
            if number >= 1 && number <= evidence.len() {
                cited.insert(number);
            } else {
                unsupported.insert(number);
            }
        }

        let mut cited_documents: Vec<String> = Vec::new();
        for number in &cited {
            let doc = &evidence.references[number - 1];
            if !cited_documents.contains(doc) {
                cited_documents.push(doc.clone());
            }
        }

        CitationAudit {
            cited: cited.into_iter().collect(),
            unsupported: unsupported.into_iter().collect(),
            cited_documents,
        }
    }
}

fn system_prompt(context: &RequestContext) -> String {
    let base = format!(
        "You are a scientific assistant. Use ONLY the provided evidence. \
        Cite every factual sentence with the bracketed number of its evidence, e.g. [1] or [2][3], \
        and never cite a number that is not listed. \
        If a claim is not directly supported, respond with '{}' for that claim. Do not invent citations.",
        UNKNOWN_ANSWER
    );

    let entities = &context.entities;
    if !entities.is_compositional {
        return base;
    }

    format!(
        "{} This question asks how {} relates to {}. Every evidence sentence has been validated to mention both. \
        Every claim about the relationship must rest on these sentences; never use evidence about only one of them \
        to assert a relationship.",
        base,
        entities.x_terms.first().map(String::as_str).unwrap_or_default(),
        entities.y_terms.first().map(String::as_str).unwrap_or_default(),
    )
}

fn user_prompt(context: &RequestContext, mode: SynthesisMode, evidence: &RenderedEvidence) -> String {
    let entities = &context.entities;
    let subject = if entities.is_compositional {
        format!(
            "the relationship between {} and {}",
            entities.x_terms.join(", "),
            entities.y_terms.join(", ")
        )
    } else {
        format!("the findings related to: {}", context.query)
    };
    let heading = if entities.is_compositional { "Evidence Sentences" } else { "Evidence" };

    match mode {
        SynthesisMode::Summary => format!(
            "Based on the following evidence, provide a concise 3-5 sentence summary of {subject}.\n\n\
            {heading}:\n{}\n\n\
            Address the question directly using only the evidence above. Cite each claim with [n].",
            evidence.text
        ),
        SynthesisMode::Detailed => format!(
            "Based on the following evidence, provide a comprehensive analysis of {subject}.\n\n\
            {heading}:\n{}\n\n\
            Your analysis must:\n\
            1. Address the question directly\n\
            2. Cite specific findings with [n]\n\
            3. Note limitations, uncertainties and conflicting findings\n\
            4. Use only the evidence above\n\n\
            If the evidence does not cover part of the question, state \"{}\"",
            evidence.text, UNKNOWN_ANSWER
        ),
    }
}

/// User-facing explanation of an insufficient-evidence verdict
pub fn insufficient_message(evidence_count: usize, is_compositional: bool) -> String {
    let scope = if is_compositional {
        "mentioning both entities"
    } else {
        "matching the question"
    };
    format!(
        "Insufficient evidence: found {} relevant {} {}, which is below our confidence threshold.",
        evidence_count,
        if evidence_count == 1 { "study" } else { "studies" },
        scope
    )
}

/// Text returned in place of a synthesis that could not or should not run
pub fn insufficient_template(evidence_count: usize, mode: SynthesisMode, is_compositional: bool) -> String {
    let goal = match mode {
        SynthesisMode::Summary => "a reliable summary",
        SynthesisMode::Detailed => "a detailed analysis",
    };
    format!(
        "{} More research is needed to provide {} ({} unavailable).",
        insufficient_message(evidence_count, is_compositional),
        goal,
        mode.noun()
    )
}
