//! Sentence-level evidence filtering
//!
//! Keeps only sentences that mention both sides of a compositional query,
//! then scores each surviving hit by relevance, relation cues and study type.

use super::domain_gate::DomainGate;
use super::entity_extractor::ExtractedEntities;
use super::text::{contains_any, contains_term_lowered, split_sentences};
use crate::models::{EvidenceChunk, EvidenceSentence, Paper};

/// Phrases signalling a stated relationship. Inflections of one cue count once.
const RELATION_CUES: &[&[&str]] = &[
    &["associated with"],
    &["linked to"],
    &["increase", "increases", "increased"],
    &["reduce", "reduces", "reduced"],
    &["elevated"],
    &["decreased"],
    &["predict", "predicts"],
    &["correlate", "correlates", "correlated"],
    &["risk"],
    &["odds ratio"],
    &["hazard ratio"],
    &["no significant"],
];

/// Study-type priors in descending order; the first matching tier wins
const STUDY_TYPE_PRIORS: &[(f64, &[&str])] = &[
    (0.25, &["meta-analysis", "systematic review", "randomized controlled", "randomised controlled", "rct"]),
    (0.15, &["human", "humans", "clinical", "cohort", "observational"]),
    (0.05, &["animal", "mouse", "mice", "rat", "rats"]),
    (0.0, &["in vitro", "cell"]),
];

/// Number of distinct relation cues in a lowercased sentence
pub fn relation_cue_count(sentence_lower: &str) -> usize {
    RELATION_CUES
        .iter()
        .filter(|forms| forms.iter().any(|f| contains_term_lowered(sentence_lower, f)))
        .count()
}

/// Prior weight for the study design described in a document's text
pub fn study_type_prior(text: &str) -> f64 {
    let lower = text.to_lowercase();
    STUDY_TYPE_PRIORS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| contains_term_lowered(&lower, m)))
        .map(|(prior, _)| *prior)
        .unwrap_or(0.0)
}

pub struct SentenceEvidenceFilter {
    gates: Vec<DomainGate>,
}

impl SentenceEvidenceFilter {
    pub fn new(gates: Vec<DomainGate>) -> Self {
        Self { gates }
    }

    /// Filter papers down to scored chunks of co-mentioning sentences.
    ///
    /// Chunk ids are the 1-based search positions. Hits without a single
    /// validated sentence are dropped. Returns chunks by total score,
    /// highest first.
    pub fn filter(&self, entities: &ExtractedEntities, papers: &[Paper]) -> Vec<EvidenceChunk> {
        if !entities.is_compositional {
            return Vec::new();
        }

        let query_lower = entities.original_query.to_lowercase();
        let gates: Vec<&DomainGate> = self.gates.iter().filter(|g| g.applies(entities)).collect();
        for gate in &gates {
            tracing::debug!(gate = gate.name(), "Domain gate active");
        }

        let mut chunks = Vec::new();
        let mut examined = 0usize;

        for (position, paper) in papers.iter().enumerate() {
            let chunk_id = (position + 1).to_string();
            let text = paper.full_text();
            let prior = study_type_prior(&text);

            let sentences: Vec<EvidenceSentence> = split_sentences(&text)
                .into_iter()
                .inspect(|_| examined += 1)
                .filter_map(|sentence| {
                    let lower = sentence.to_lowercase();
                    if !self.is_evidence(&lower, entities, &gates, &query_lower) {
                        return None;
                    }
                    Some(EvidenceSentence {
                        relation_cue_count: relation_cue_count(&lower),
                        text: sentence,
                        source_chunk_id: chunk_id.clone(),
                        source_doc_id: paper.id.clone(),
                        study_type_prior: prior,
                    })
                })
                .collect();

            if !sentences.is_empty() {
                chunks.push(EvidenceChunk::new(chunk_id, paper.clone(), sentences, prior));
            }
        }

        chunks.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));

        tracing::debug!(
            papers = papers.len(),
            sentences_examined = examined,
            chunks = chunks.len(),
            "Sentence filtering complete"
        );

        chunks
    }

    fn is_evidence(
        &self,
        sentence_lower: &str,
        entities: &ExtractedEntities,
        gates: &[&DomainGate],
        query_lower: &str,
    ) -> bool {
        if !contains_any(sentence_lower, &entities.x_terms) || !contains_any(sentence_lower, &entities.y_terms) {
            return false;
        }
        if !entities.disambiguators.is_empty() && !contains_any(sentence_lower, &entities.disambiguators) {
            return false;
        }
        gates.iter().all(|gate| gate.admits(sentence_lower, query_lower))
    }
}
