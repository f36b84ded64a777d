//! Evidence records produced by sentence filtering and deduplication

use super::Paper;
use serde::{Deserialize, Serialize};

/// Score added per relation cue found in an evidence sentence
pub const RELATION_BONUS_PER_CUE: f64 = 0.1;

/// A sentence validated to mention every entity the query relates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSentence {
    pub text: String,
    pub source_chunk_id: String,
    pub source_doc_id: String,
    /// Distinct relation-indicating phrases in the sentence
    pub relation_cue_count: usize,
    /// Study-type prior of the source document
    pub study_type_prior: f64,
}

/// One scored search hit together with the evidence sentences taken from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub chunk_id: String,
    pub paper: Paper,
    pub sentences: Vec<EvidenceSentence>,
    pub base_relevance_score: f64,
    pub relation_bonus: f64,
    pub study_type_prior: f64,
    pub total_score: f64,
}

impl EvidenceChunk {
    pub fn new(chunk_id: String, paper: Paper, sentences: Vec<EvidenceSentence>, study_type_prior: f64) -> Self {
        let base_relevance_score = paper.raw_score;
        let relation_bonus = relation_bonus(&sentences);
        Self {
            chunk_id,
            paper,
            sentences,
            base_relevance_score,
            relation_bonus,
            study_type_prior,
            total_score: base_relevance_score + relation_bonus + study_type_prior,
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.paper.id
    }
}

/// All evidence for one document after deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedEvidence {
    pub doc_id: String,
    /// Paper fields of the strongest member chunk
    pub paper: Paper,
    /// Sentences in order of first appearance
    pub evidence_sentences: Vec<EvidenceSentence>,
    pub base_relevance_score: f64,
    pub relation_bonus: f64,
    pub study_type_prior: f64,
    pub total_score: f64,
}

impl ConsolidatedEvidence {
    pub fn from_chunk(chunk: EvidenceChunk) -> Self {
        let mut entry = Self {
            doc_id: chunk.paper.id.clone(),
            paper: chunk.paper,
            evidence_sentences: chunk.sentences,
            base_relevance_score: chunk.base_relevance_score,
            relation_bonus: 0.0,
            study_type_prior: chunk.study_type_prior,
            total_score: 0.0,
        };
        entry.recompute();
        entry
    }

    /// Recompute derived scores from the current members.
    pub fn recompute(&mut self) {
        self.relation_bonus = relation_bonus(&self.evidence_sentences);
        self.total_score = self.base_relevance_score + self.relation_bonus + self.study_type_prior;
    }

    pub fn relation_cue_count(&self) -> usize {
        self.evidence_sentences.iter().map(|s| s.relation_cue_count).sum()
    }

    /// Best excerpt for display: the first evidence sentence, else the abstract
    pub fn snippet(&self, max_chars: usize) -> String {
        let source = self
            .evidence_sentences
            .first()
            .map(|s| s.text.as_str())
            .unwrap_or(self.paper.abstract_text.as_str());
        truncate_chars(source, max_chars)
    }
}

impl From<EvidenceChunk> for ConsolidatedEvidence {
    fn from(chunk: EvidenceChunk) -> Self {
        Self::from_chunk(chunk)
    }
}

fn relation_bonus(sentences: &[EvidenceSentence]) -> f64 {
    let cues: usize = sentences.iter().map(|s| s.relation_cue_count).sum();
    RELATION_BONUS_PER_CUE * cues as f64
}

/// Truncate on a char boundary, appending "..." when shortened
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
