//! Sufficiency gate between retrieval and synthesis

use crate::config::PipelineConfig;
use crate::models::ConsolidatedEvidence;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficiencyReason {
    TooFewChunks,
    TooFewDocuments,
    TooFewSentences,
}

impl InsufficiencyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooFewChunks => "too_few_chunks",
            Self::TooFewDocuments => "too_few_documents",
            Self::TooFewSentences => "too_few_sentences",
        }
    }
}

impl fmt::Display for InsufficiencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request stopped before synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientEvidence {
    pub reason: InsufficiencyReason,
    /// Count of the failing quantity
    pub found: usize,
    /// Threshold of the failing quantity
    pub required: usize,
    /// Number of evidence entries that did survive filtering
    pub evidence_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SufficiencyVerdict {
    Sufficient(Vec<ConsolidatedEvidence>),
    Insufficient(InsufficientEvidence),
}

impl SufficiencyVerdict {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient(_))
    }
}

/// Minimum evidence required before synthesis may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SufficiencyGate {
    pub min_chunks: usize,
    pub min_documents: usize,
    pub min_evidence_sentences: usize,
}

impl Default for SufficiencyGate {
    fn default() -> Self {
        Self {
            min_chunks: 6,
            min_documents: 3,
            min_evidence_sentences: 3,
        }
    }
}

impl From<&PipelineConfig> for SufficiencyGate {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_chunks: config.min_chunks,
            min_documents: config.min_documents,
            min_evidence_sentences: config.min_evidence_sentences,
        }
    }
}

impl SufficiencyGate {
    /// Check entries against the thresholds in order: entries, distinct
    /// documents, then (compositional queries only) evidence sentences.
    pub fn evaluate(&self, entries: Vec<ConsolidatedEvidence>, is_compositional: bool) -> SufficiencyVerdict {
        let evidence_count = entries.len();
        let insufficient = |reason, found, required| {
            SufficiencyVerdict::Insufficient(InsufficientEvidence {
                reason,
                found,
                required,
                evidence_count,
            })
        };

        if evidence_count < self.min_chunks {
            return insufficient(InsufficiencyReason::TooFewChunks, evidence_count, self.min_chunks);
        }

        let documents = entries.iter().map(|e| e.doc_id.as_str()).collect::<HashSet<_>>().len();
        if documents < self.min_documents {
            return insufficient(InsufficiencyReason::TooFewDocuments, documents, self.min_documents);
        }

        if is_compositional {
            let sentences: usize = entries.iter().map(|e| e.evidence_sentences.len()).sum();
            if sentences < self.min_evidence_sentences {
                return insufficient(
                    InsufficiencyReason::TooFewSentences,
                    sentences,
                    self.min_evidence_sentences,
                );
            }
        }

        SufficiencyVerdict::Sufficient(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceSentence, Paper};

    fn entry(doc: &str, sentences: usize) -> ConsolidatedEvidence {
        ConsolidatedEvidence {
            doc_id: doc.to_string(),
            paper: Paper {
                id: doc.to_string(),
                title: doc.to_string(),
                abstract_text: String::new(),
                journal: None,
                year: None,
                source: None,
                raw_score: 1.0,
            },
            evidence_sentences: (0..sentences)
                .map(|i| EvidenceSentence {
                    text: format!("{doc} {i}"),
                    source_chunk_id: "1".to_string(),
                    source_doc_id: doc.to_string(),
                    relation_cue_count: 0,
                    study_type_prior: 0.0,
                })
                .collect(),
            base_relevance_score: 1.0,
            relation_bonus: 0.0,
            study_type_prior: 0.0,
            total_score: 1.0,
        }
    }

    #[test]
    fn test_too_few_chunks() {
        let verdict = SufficiencyGate::default().evaluate(vec![entry("a", 1); 5], true);
        match verdict {
            SufficiencyVerdict::Insufficient(info) => {
                assert_eq!(info.reason, InsufficiencyReason::TooFewChunks);
                assert_eq!(info.found, 5);
                assert_eq!(info.required, 6);
                assert_eq!(info.evidence_count, 5);
            }
            other => panic!("expected insufficient, got {other:?}"),
        }
    }

    #[test]
    fn test_document_count_is_independent() {
        // Six entries but only two distinct documents
        let entries = vec![
            entry("a", 1),
            entry("a", 1),
            entry("a", 1),
            entry("b", 1),
            entry("b", 1),
            entry("b", 1),
        ];
        let verdict = SufficiencyGate::default().evaluate(entries, true);
        match verdict {
            SufficiencyVerdict::Insufficient(info) => {
                assert_eq!(info.reason, InsufficiencyReason::TooFewDocuments);
                assert_eq!(info.found, 2);
                assert_eq!(info.required, 3);
            }
            other => panic!("expected insufficient, got {other:?}"),
        }
    }

    #[test]
    fn test_sentence_check_compositional_only() {
        let entries: Vec<_> = ["a", "b", "c", "d", "e", "f"].iter().map(|d| entry(d, 0)).collect();

        let verdict = SufficiencyGate::default().evaluate(entries.clone(), true);
        assert!(matches!(
            verdict,
            SufficiencyVerdict::Insufficient(InsufficientEvidence {
                reason: InsufficiencyReason::TooFewSentences,
                ..
            })
        ));

        assert!(SufficiencyGate::default().evaluate(entries, false).is_sufficient());
    }

    #[test]
    fn test_sufficient_passes_entries_through() {
        let entries: Vec<_> = ["a", "b", "c", "d", "e", "f"].iter().map(|d| entry(d, 1)).collect();
        match SufficiencyGate::default().evaluate(entries.clone(), true) {
            SufficiencyVerdict::Sufficient(kept) => assert_eq!(kept, entries),
            other => panic!("expected sufficient, got {other:?}"),
        }
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&InsufficiencyReason::TooFewDocuments).unwrap(),
            "\"too_few_documents\""
        );
    }
}
