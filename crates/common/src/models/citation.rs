//! Citation card returned to API clients

use super::ConsolidatedEvidence;
use serde::{Deserialize, Serialize};

/// Maximum snippet length on a citation card
pub const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// PMID, DOI or URL of the source document
    pub identifier: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub url: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
}

impl From<&ConsolidatedEvidence> for Citation {
    fn from(entry: &ConsolidatedEvidence) -> Self {
        Self {
            identifier: entry.doc_id.clone(),
            title: entry.paper.title.clone(),
            snippet: entry.snippet(SNIPPET_CHARS),
            score: entry.total_score,
            url: entry.paper.url(),
            journal: entry.paper.journal.clone(),
            year: entry.paper.year,
        }
    }
}
