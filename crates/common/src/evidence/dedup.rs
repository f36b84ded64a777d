//! Document-level deduplication of evidence chunks

use crate::models::ConsolidatedEvidence;
use std::collections::HashMap;

/// Merge evidence that comes from the same document.
///
/// Accepts raw chunks or already consolidated entries. Groups keep the order
/// in which documents first appear. Each group takes the highest base
/// relevance and study prior of its members and the paper fields of its
/// strongest member, keeps each distinct sentence once in first-appearance
/// order, and recomputes its relation bonus over them. A merged score is
/// therefore never below any member's score, and applying the merge to its
/// own output changes nothing.
pub fn deduplicate<E>(items: Vec<E>) -> Vec<ConsolidatedEvidence>
where
    E: Into<ConsolidatedEvidence>,
{
    let input_len = items.len();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ConsolidatedEvidence> = Vec::new();

    for item in items {
        let entry = item.into();
        match index.get(&entry.doc_id).copied() {
            Some(slot) => absorb(&mut merged[slot], entry),
            None => {
                index.insert(entry.doc_id.clone(), merged.len());
                merged.push(entry);
            }
        }
    }

    for entry in &mut merged {
        entry.recompute();
    }
    sort_by_score(&mut merged);

    tracing::debug!(inputs = input_len, documents = merged.len(), "Deduplicated evidence");
    merged
}

fn absorb(target: &mut ConsolidatedEvidence, entry: ConsolidatedEvidence) {
    // Ties keep the earlier member's paper fields
    if entry.base_relevance_score > target.base_relevance_score {
        target.paper = entry.paper;
        target.base_relevance_score = entry.base_relevance_score;
    }
    target.study_type_prior = target.study_type_prior.max(entry.study_type_prior);

    for sentence in entry.evidence_sentences {
        if !target.evidence_sentences.iter().any(|s| s.text == sentence.text) {
            target.evidence_sentences.push(sentence);
        }
    }
}

/// Stable descending sort by total score
fn sort_by_score(entries: &mut [ConsolidatedEvidence]) {
    entries.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvidenceChunk, EvidenceSentence, Paper};

    fn chunk(chunk_id: &str, doc: &str, title: &str, score: f64, cues: &[usize], prior: f64) -> EvidenceChunk {
        let paper = Paper {
            id: doc.to_string(),
            title: title.to_string(),
            abstract_text: String::new(),
            journal: None,
            year: None,
            source: None,
            raw_score: score,
        };
        let sentences = cues
            .iter()
            .enumerate()
            .map(|(i, &c)| EvidenceSentence {
                text: format!("{doc}-{chunk_id}-{i}"),
                source_chunk_id: chunk_id.to_string(),
                source_doc_id: doc.to_string(),
                relation_cue_count: c,
                study_type_prior: prior,
            })
            .collect();
        EvidenceChunk::new(chunk_id.to_string(), paper, sentences, prior)
    }

    fn sample() -> Vec<EvidenceChunk> {
        vec![
            chunk("1", "doc-a", "A weak", 1.0, &[1], 0.15),
            chunk("2", "doc-b", "B", 2.0, &[0], 0.0),
            chunk("3", "doc-a", "A strong", 1.5, &[2, 0], 0.05),
        ]
    }

    #[test]
    fn test_merges_by_document() {
        let merged = deduplicate(sample());
        assert_eq!(merged.len(), 2);

        let a = merged.iter().find(|e| e.doc_id == "doc-a").unwrap();
        assert_eq!(a.paper.title, "A strong");
        assert_eq!(a.base_relevance_score, 1.5);
        assert_eq!(a.study_type_prior, 0.15);
        assert_eq!(a.relation_cue_count(), 3);
        assert_eq!(a.evidence_sentences[0].text, "doc-a-1-0");
        assert!((a.total_score - (1.5 + 0.3 + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn test_sorted_and_unique() {
        let merged = deduplicate(sample());
        assert_eq!(merged[0].doc_id, "doc-b");
        assert!(merged.windows(2).all(|w| w[0].total_score >= w[1].total_score));

        let mut ids: Vec<_> = merged.iter().map(|e| e.doc_id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), merged.len());
    }

    #[test]
    fn test_merged_score_dominates_members() {
        let members = sample();
        let member_scores: Vec<(String, f64)> = members
            .iter()
            .map(|c| (c.doc_id().to_string(), c.total_score))
            .collect();

        let merged = deduplicate(members);
        for (doc, score) in member_scores {
            let entry = merged.iter().find(|e| e.doc_id == doc).unwrap();
            assert!(entry.total_score >= score);
        }
    }

    #[test]
    fn test_idempotent() {
        let once = deduplicate(sample());
        let twice = deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_repeated_hit_does_not_inflate_bonus() {
        let hit = || chunk("1", "doc-a", "A", 1.0, &[2], 0.0);
        let single = deduplicate(vec![hit()]);
        let repeated = deduplicate(vec![hit(), hit(), hit()]);

        assert_eq!(repeated.len(), 1);
        assert_eq!(repeated[0].evidence_sentences.len(), 1);
        assert_eq!(repeated[0].relation_bonus, single[0].relation_bonus);
        assert_eq!(repeated[0].total_score, single[0].total_score);
    }

    #[test]
    fn test_mixed_results_merge_again() {
        let first = deduplicate(sample());
        let mut combined = first.clone();
        combined.extend(deduplicate(vec![chunk("9", "doc-a", "A newer", 3.0, &[1], 0.0)]));

        let merged = deduplicate(combined);
        assert_eq!(merged.len(), 2);
        let a = merged.iter().find(|e| e.doc_id == "doc-a").unwrap();
        assert_eq!(a.paper.title, "A newer");
        assert_eq!(a.evidence_sentences.len(), 4);
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let merged = deduplicate(vec![
            chunk("1", "x", "X", 1.0, &[0], 0.0),
            chunk("2", "y", "Y", 1.0, &[0], 0.0),
        ]);
        assert_eq!(merged[0].doc_id, "x");
        assert_eq!(merged[1].doc_id, "y");
    }

    #[test]
    fn test_empty() {
        assert!(deduplicate(Vec::<EvidenceChunk>::new()).is_empty());
    }
}
