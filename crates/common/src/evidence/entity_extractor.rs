//! Entity Extractor - Splits a research question into the concepts it relates
//!
//! Provides:
//! - Compositional pattern matching ("effect of X on Y", "X vs Y", ...)
//! - Single-topic detection with a token-overlap guard
//! - Synonym expansion per side
//! - Disambiguation terms for ambiguous abbreviations

use super::text::{contains_term_lowered, word_tokens};
use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Entities extracted from one query. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// X-side terms (the only side for single-entity queries)
    pub x_terms: Vec<String>,

    /// Y-side terms, empty unless compositional
    pub y_terms: Vec<String>,

    /// Context words one of which must co-occur with an ambiguous Y term
    pub disambiguators: Vec<String>,

    pub is_compositional: bool,

    /// Query as submitted
    pub original_query: String,

    /// Name of the surface pattern that matched
    pub matched_pattern: Option<String>,
}

impl ExtractedEntities {
    fn single(original_query: &str, x_terms: Vec<String>) -> Self {
        Self {
            x_terms,
            y_terms: Vec::new(),
            disambiguators: Vec::new(),
            is_compositional: false,
            original_query: original_query.to_string(),
            matched_pattern: None,
        }
    }
}

/// A group of interchangeable surface forms for one concept
struct SynonymGroup {
    key: &'static str,
    terms: &'static [&'static str],
}

/// An abbreviation shared by unrelated conditions, with the context words
/// that identify the intended referent.
struct AmbiguousAbbreviation {
    abbreviation: &'static str,
    referent: &'static str,
    disambiguators: &'static [&'static str],
}

const SYNONYM_GROUPS: &[SynonymGroup] = &[
    SynonymGroup { key: "microplastics", terms: &["microplastics", "microplastic", "plastic particles", "nanoplastics", "nanoplastic", "plastic debris"] },
    SynonymGroup { key: "testosterone", terms: &["testosterone", "androgen", "androgens", "male hormone", "free testosterone"] },
    SynonymGroup { key: "alzheimer", terms: &["alzheimer", "alzheimer's", "alzheimer's disease", "ad", "dementia", "cognitive decline", "neurodegeneration"] },
    SynonymGroup { key: "multiple sclerosis", terms: &["multiple sclerosis", "ms", "demyelinating disease"] },
    SynonymGroup { key: "cancer", terms: &["cancer", "tumor", "tumour", "neoplasm", "malignancy", "carcinoma"] },
    SynonymGroup { key: "diabetes", terms: &["diabetes", "diabetic", "blood sugar", "glucose", "insulin resistance"] },
    SynonymGroup { key: "inflammation", terms: &["inflammation", "inflammatory", "neuroinflammation", "inflammatory response"] },
    SynonymGroup { key: "cardiovascular", terms: &["cardiovascular", "heart", "cardiac", "circulatory", "vascular"] },
    SynonymGroup { key: "immune", terms: &["immune", "immunity", "immunological"] },
    SynonymGroup { key: "oxidative stress", terms: &["oxidative stress", "oxidative", "oxidation", "free radicals", "reactive oxygen species", "ros"] },
    SynonymGroup { key: "creatine", terms: &["creatine", "creatine supplementation", "creatine monohydrate"] },
    SynonymGroup { key: "kidney", terms: &["kidney", "kidneys", "renal", "kidney function", "egfr", "creatinine", "glomerular filtration", "nephrotoxicity"] },
    SynonymGroup { key: "exercise", terms: &["exercise", "physical activity", "training", "resistance training", "aerobic exercise", "workout"] },
    SynonymGroup { key: "muscle", terms: &["muscle", "muscle growth", "hypertrophy", "muscle mass", "lean mass", "skeletal muscle"] },
    SynonymGroup { key: "sleep", terms: &["sleep", "insomnia", "sleep quality", "sleep duration"] },
    SynonymGroup { key: "caffeine", terms: &["caffeine", "coffee"] },
    SynonymGroup { key: "depression", terms: &["depression", "depressive", "major depressive disorder", "mdd"] },
    SynonymGroup { key: "obesity", terms: &["obesity", "obese", "adiposity", "body mass index", "bmi"] },
    SynonymGroup { key: "gut microbiome", terms: &["gut microbiome", "microbiome", "microbiota", "gut bacteria", "intestinal flora"] },
    SynonymGroup { key: "vitamin d", terms: &["vitamin d", "cholecalciferol", "25-hydroxyvitamin d"] },
];

const AMBIGUOUS_ABBREVIATIONS: &[AmbiguousAbbreviation] = &[
    // AD also abbreviates atopic dermatitis
    AmbiguousAbbreviation {
        abbreviation: "ad",
        referent: "alzheimer",
        disambiguators: &[
            "alzheimer", "alzheimer's", "amyloid", "beta-amyloid", "aβ", "tau", "tauopathy",
            "hippocampus", "hippocampal", "cognitive", "cognition", "dementia",
            "neurodegeneration", "neurodegenerative", "neurofibrillary", "plaques",
        ],
    },
    // MS also abbreviates mass spectrometry
    AmbiguousAbbreviation {
        abbreviation: "ms",
        referent: "multiple sclerosis",
        disambiguators: &[
            "multiple sclerosis", "demyelination", "demyelinating", "relapsing",
            "remitting", "myelin", "lesions", "neurological",
        ],
    },
];

/// Maximum share of the smaller span's tokens the two spans may share
const MAX_SPAN_OVERLAP: f64 = 0.3;

/// Synonym group members this short only trigger on whole words
const SHORT_MEMBER_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been",
    "in", "on", "at", "to", "for", "of", "with", "by", "from",
    "and", "or", "but", "not", "this", "that", "these", "those",
    "it", "its", "as", "do", "does", "did", "has", "have", "had",
    "can", "could", "will", "would", "should", "may", "might",
    "what", "which", "who", "how", "why", "when", "where", "best",
    "work", "works", "treatment", "therapy", "adults", "healthy",
    "effect", "effects", "impact", "there", "any", "about",
];

/// Words stripped from the front of a captured span
const LEADING_FILLER: &[&str] = &[
    "what", "which", "is", "are", "was", "were", "the", "a", "an", "does", "do", "did",
    "how", "there", "between", "of", "any", "can", "could", "will", "would", "should",
    "compare", "comparing", "difference", "about",
];

/// Ordered compositional patterns; more specific shapes come first
const COMPOSITIONAL_PATTERNS: &[(&str, &str)] = &[
    ("effect_of_on", r"\b(?:effects?|impacts?|influence|role)\s+of\s+([^,;:]+?)\s+on\s+([^,;:]+)"),
    ("does_affect", r"\bdoes\s+([^,;:]+?)\s+affect\s+([^,;:]+)"),
    ("relation_between", r"\b(?:associations?|relationships?|correlations?|links?)\s+between\s+([^,;:]+?)\s+and\s+([^,;:]+)"),
    ("and_relation", r"([^,;:]+?)\s+and\s+([^,;:]+?)\s+(?:associations?|relationships?|correlations?|links?)\b"),
    ("versus", r"([^,;:]+?)\s+vs\.?\s+([^,;:]+)"),
    ("compared_to", r"([^,;:]+?)\s+compared\s+(?:to|with)\s+([^,;:]+)"),
    ("treatment_for", r"([^,;:]+?)\s+(?:treatment|therapy)\s+for\s+([^,;:]+)"),
];

/// Words that always introduce a second side; they switch the cues off
const SIDE_CONNECTIVES: &[&str] = &["vs", "compared", "on", "between"];

/// Phrasings that ask about one topic even when two nouns appear
const SINGLE_ENTITY_CUES: &[&str] = &[
    r"^how\s+(?:does|do|is|are)\s+.+\s+work",
    r"^does\s+.+\s+(?:impair|improve|increase|decrease|reduce|boost|cause)\s+",
];

/// "what are the effects of X"
const EFFECTS_OF_CUE: &str = r"^what\s+(?:are|is)\s+the\s+(?:side\s+)?effects?\s+of\s+";

/// Entity extractor for research questions
pub struct EntityExtractor {
    patterns: Vec<(&'static str, Regex)>,
    single_entity_cues: Vec<Regex>,
    effects_of_cue: Regex,
    versus: Regex,
    stop_words: HashSet<&'static str>,
}

impl EntityExtractor {
    /// Create a new extractor
    pub fn new() -> Result<Self> {
        let patterns = COMPOSITIONAL_PATTERNS
            .iter()
            .map(|(name, pattern)| compile(pattern).map(|regex| (*name, regex)))
            .collect::<Result<Vec<_>>>()?;

        let single_entity_cues = SINGLE_ENTITY_CUES
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            single_entity_cues,
            effects_of_cue: compile(EFFECTS_OF_CUE)?,
            versus: compile(r"\bversus\b")?,
            stop_words: STOP_WORDS.iter().copied().collect(),
        })
    }

    /// Extract entities from a query. Never fails.
    pub fn extract(&self, query: &str) -> ExtractedEntities {
        let normalized = self.normalize(query);

        if self.is_single_entity_query(&normalized) {
            return ExtractedEntities::single(query, self.content_terms(&normalized));
        }

        let Some((pattern, x_raw, y_raw)) = self.match_compositional(&normalized) else {
            return ExtractedEntities::single(query, self.content_terms(&normalized));
        };

        if !are_distinct(&x_raw, &y_raw) {
            tracing::debug!(x = %x_raw, y = %y_raw, "Spans overlap, treating as single topic");
            return ExtractedEntities::single(query, self.content_terms(&normalized));
        }

        let x_terms = expand_term(&x_raw);
        let y_terms = expand_term(&y_raw);
        let disambiguators = disambiguators_for(&y_terms);

        ExtractedEntities {
            x_terms,
            y_terms,
            disambiguators,
            is_compositional: true,
            original_query: query.to_string(),
            matched_pattern: Some(pattern.to_string()),
        }
    }

    /// Lowercase, trim, collapse whitespace and spell "versus" as "vs"
    fn normalize(&self, query: &str) -> String {
        let collapsed = query
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        self.versus.replace_all(&collapsed, "vs").into_owned()
    }

    fn is_single_entity_query(&self, normalized: &str) -> bool {
        let names_two_sides = normalized
            .split_whitespace()
            .any(|w| SIDE_CONNECTIVES.contains(&w.trim_end_matches(['.', ',', '?'])));
        if names_two_sides {
            return false;
        }

        self.single_entity_cues.iter().any(|cue| cue.is_match(normalized))
            || self.effects_of_cue.is_match(normalized)
    }

    /// First matching pattern wins; spans that clean up to nothing are skipped
    fn match_compositional(&self, normalized: &str) -> Option<(&'static str, String, String)> {
        for (name, regex) in &self.patterns {
            let Some(caps) = regex.captures(normalized) else {
                continue;
            };
            let (Some(x), Some(y)) = (caps.get(1), caps.get(2)) else {
                continue;
            };

            let x_raw = clean_span(x.as_str());
            let y_raw = clean_span(y.as_str());
            if x_raw.is_empty() || y_raw.is_empty() {
                continue;
            }
            return Some((*name, x_raw, y_raw));
        }
        None
    }

    /// Content words (stop words removed, length > 2), each expanded
    fn content_terms(&self, normalized: &str) -> Vec<String> {
        let mut terms = Vec::new();
        for token in word_tokens(normalized) {
            if token.chars().count() <= 2 || self.stop_words.contains(token.as_str()) {
                continue;
            }
            terms.extend(expand_term(&token));
        }
        dedup_case_insensitive(terms)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::Configuration {
        message: format!("Invalid entity pattern '{}': {}", pattern, e),
    })
}

/// Trim punctuation, leading filler words and trailing "for"/"to" clauses
fn clean_span(span: &str) -> String {
    let mut span = span
        .trim()
        .trim_end_matches(['?', '.', '!', ',', ';', ':', '"', '\''])
        .trim()
        .to_string();

    for marker in [" for ", " to "] {
        if let Some(pos) = span.find(marker) {
            if pos > 0 {
                span.truncate(pos);
            }
        }
    }

    let words: Vec<&str> = span.split_whitespace().collect();
    let start = words
        .iter()
        .position(|w| !LEADING_FILLER.contains(w))
        .unwrap_or(words.len());
    words[start..].join(" ")
}

/// Two spans name distinct entities unless they share more than 30% of the
/// smaller span's tokens.
fn are_distinct(x_raw: &str, y_raw: &str) -> bool {
    let x: HashSet<String> = word_tokens(x_raw).into_iter().collect();
    let y: HashSet<String> = word_tokens(y_raw).into_iter().collect();
    let smaller = x.len().min(y.len());
    if smaller == 0 {
        return false;
    }
    let overlap = x.intersection(&y).count();
    (overlap as f64) <= MAX_SPAN_OVERLAP * smaller as f64
}

fn member_matches(raw_lower: &str, member: &str) -> bool {
    if member.chars().count() <= SHORT_MEMBER_LEN {
        contains_term_lowered(raw_lower, member)
    } else {
        raw_lower.contains(member)
    }
}

/// Expand a raw term through the synonym table.
///
/// The raw term comes first, followed by every member of each group one of
/// whose members occurs in the raw term. Duplicates are removed
/// case-insensitively, keeping first-seen order.
pub fn expand_term(raw: &str) -> Vec<String> {
    let raw_lower = raw.trim().to_lowercase();
    if raw_lower.is_empty() {
        return Vec::new();
    }

    let mut expanded = vec![raw_lower.clone()];
    for group in SYNONYM_GROUPS {
        if group.terms.iter().any(|member| member_matches(&raw_lower, member)) {
            tracing::trace!(raw = %raw_lower, group = group.key, "Synonym group matched");
            expanded.extend(group.terms.iter().map(|t| t.to_string()));
        }
    }
    dedup_case_insensitive(expanded)
}

/// Disambiguators for the first ambiguous abbreviation among the Y terms
fn disambiguators_for(y_terms: &[String]) -> Vec<String> {
    AMBIGUOUS_ABBREVIATIONS
        .iter()
        .find(|entry| y_terms.iter().any(|t| t.eq_ignore_ascii_case(entry.abbreviation)))
        .map(|entry| {
            tracing::debug!(
                abbreviation = entry.abbreviation,
                referent = entry.referent,
                "Ambiguous abbreviation on Y side"
            );
            entry.disambiguators.iter().map(|d| d.to_string()).collect()
        })
        .unwrap_or_default()
}

fn dedup_case_insensitive(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new().unwrap()
    }

    #[test]
    fn test_effect_of_on() {
        let entities = extractor().extract("Effect of microplastics on kidney function?");

        assert!(entities.is_compositional);
        assert_eq!(entities.matched_pattern.as_deref(), Some("effect_of_on"));
        assert_eq!(entities.x_terms[0], "microplastics");
        assert!(entities.x_terms.contains(&"microplastic".to_string()));
        assert_eq!(entities.y_terms[0], "kidney function");
        assert!(entities.y_terms.contains(&"renal".to_string()));
        assert!(entities.disambiguators.is_empty());
    }

    #[test]
    fn test_versus_with_synonyms() {
        let entities = extractor().extract("testosterone vs exercise on muscle growth");

        assert!(entities.is_compositional);
        assert!(entities.x_terms.contains(&"testosterone".to_string()));
        assert!(entities.x_terms.contains(&"androgen".to_string()));
        assert!(entities.y_terms.contains(&"exercise".to_string()));
        assert!(entities.y_terms.contains(&"physical activity".to_string()));
        assert!(!entities.x_terms.contains(&"exercise".to_string()));
    }

    #[test]
    fn test_versus_spelled_out() {
        let entities = extractor().extract("Creatine versus caffeine");
        assert!(entities.is_compositional);
        assert_eq!(entities.matched_pattern.as_deref(), Some("versus"));
        assert_eq!(entities.x_terms[0], "creatine");
        assert_eq!(entities.y_terms[0], "caffeine");
    }

    #[test]
    fn test_single_topic_regression() {
        let entities = extractor().extract("creatine supplementation and kidney function");

        assert!(!entities.is_compositional);
        assert!(entities.y_terms.is_empty());
        assert!(entities.x_terms.contains(&"creatine".to_string()));
        assert!(entities.x_terms.contains(&"kidney".to_string()));
    }

    #[test]
    fn test_overlapping_spans_are_single_topic() {
        let entities = extractor().extract("vitamin d levels vs vitamin d intake");
        assert!(!entities.is_compositional);
    }

    #[test]
    fn test_specific_pattern_wins() {
        // "effect of X on Y" must win over the generic "treatment for" shape
        let entities = extractor().extract("effect of metformin treatment for diabetes on kidney function");
        assert_eq!(entities.matched_pattern.as_deref(), Some("effect_of_on"));
    }

    #[test]
    fn test_trailing_clauses_trimmed() {
        let entities = extractor().extract("does caffeine affect sleep for shift workers?");
        assert!(entities.is_compositional);
        assert_eq!(entities.x_terms[0], "caffeine");
        assert_eq!(entities.y_terms[0], "sleep");
    }

    #[test]
    fn test_association_between() {
        let entities = extractor().extract("Is there an association between obesity and depression?");
        assert!(entities.is_compositional);
        assert_eq!(entities.x_terms[0], "obesity");
        assert_eq!(entities.y_terms[0], "depression");
    }

    #[test]
    fn test_and_relation_strips_filler() {
        let entities = extractor().extract("what is the gut microbiome and obesity link");
        assert!(entities.is_compositional);
        assert_eq!(entities.x_terms[0], "gut microbiome");
        assert_eq!(entities.y_terms[0], "obesity");
    }

    #[test]
    fn test_single_entity_cues() {
        let ex = extractor();
        assert!(!ex.extract("How does metformin work").is_compositional);
        assert!(!ex.extract("What are the effects of caffeine").is_compositional);
        assert!(ex.extract("What are the effects of caffeine on sleep").is_compositional);
        assert!(!ex.extract("does creatine improve strength").is_compositional);
    }

    #[test]
    fn test_connective_overrides_single_entity_cue() {
        let entities = extractor().extract("What are the side effects of statins compared to placebo?");
        assert!(entities.is_compositional);
        assert_eq!(entities.matched_pattern.as_deref(), Some("compared_to"));
        assert_eq!(entities.x_terms[0], "side effects of statins");
        assert_eq!(entities.y_terms, vec!["placebo".to_string()]);
        assert!(!entities.x_terms.contains(&"placebo".to_string()));
    }

    #[test]
    fn test_ambiguous_abbreviation_disambiguators() {
        let entities = extractor().extract("effect of microplastics on AD");
        assert!(entities.is_compositional);
        assert!(entities.y_terms.contains(&"alzheimer's".to_string()));
        assert!(entities.disambiguators.contains(&"amyloid".to_string()));
        assert!(!entities.disambiguators.contains(&"ad".to_string()));

        // X side abbreviations do not attach disambiguators
        let entities = extractor().extract("effect of dementia on sleep");
        assert!(entities.disambiguators.is_empty());
    }

    #[test]
    fn test_no_match_falls_back_to_content_words() {
        let entities = extractor().extract("  Latest research on microplastics  ");
        assert!(!entities.is_compositional);
        assert!(entities.x_terms.contains(&"latest".to_string()));
        assert!(entities.x_terms.contains(&"microplastic".to_string()));
        assert!(!entities.x_terms.contains(&"on".to_string()));
        assert_eq!(entities.original_query, "  Latest research on microplastics  ");
    }

    #[test]
    fn test_expand_term() {
        let expanded = expand_term("Kidney Function");
        assert_eq!(expanded[0], "kidney function");
        // "kidney function" is both the raw term and a member; kept once
        assert_eq!(expanded.iter().filter(|t| *t == "kidney function").count(), 1);
        assert!(expanded.contains(&"egfr".to_string()));

        // Short members only trigger as whole words
        assert_eq!(expand_term("headache"), vec!["headache".to_string()]);
        assert!(expand_term("ms").contains(&"multiple sclerosis".to_string()));
    }

    #[test]
    fn test_compositional_sides_non_empty() {
        let ex = extractor();
        for query in [
            "impact of sleep on depression",
            "coffee compared to exercise",
            "vitamin d treatment for depression",
            "obesity and cancer correlation",
            "what are the side effects of statins compared to placebo",
            "does creatine improve strength vs placebo",
        ] {
            let entities = ex.extract(query);
            assert!(entities.is_compositional, "{query}");
            assert!(!entities.x_terms.is_empty() && !entities.y_terms.is_empty(), "{query}");
        }
    }
}
