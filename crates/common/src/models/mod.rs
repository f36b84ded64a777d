//! Fixed-shape records shared by the retrieval and synthesis stages

mod citation;
mod evidence;
mod paper;

pub use citation::{Citation, SNIPPET_CHARS};
pub use evidence::{
    truncate_chars, ConsolidatedEvidence, EvidenceChunk, EvidenceSentence, RELATION_BONUS_PER_CUE,
};
pub use paper::{Paper, SearchHit, UNTITLED};
