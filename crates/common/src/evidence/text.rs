//! Sentence segmentation and whole-word term matching

/// Split text into sentences on `.`, `!` and `?`.
///
/// Runs of terminal punctuation form a single boundary. Sentences are
/// trimmed and empty ones discarded.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word, case-insensitive containment of `term` in `text`.
///
/// Both ends of a match must sit on a word boundary, so "ai" never matches
/// inside "said".
pub fn contains_term(text: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }
    contains_term_lowered(&text.to_lowercase(), &term)
}

/// Same as [`contains_term`] with both inputs already lowercased.
pub fn contains_term_lowered(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let needs_left = term.chars().next().is_some_and(is_word_char);
    let needs_right = term.chars().next_back().is_some_and(is_word_char);

    let mut from = 0;
    while let Some(offset) = text[from..].find(term) {
        let start = from + offset;
        let end = start + term.len();

        let left_ok = !needs_left || !text[..start].chars().next_back().is_some_and(is_word_char);
        let right_ok = !needs_right || !text[end..].chars().next().is_some_and(is_word_char);
        if left_ok && right_ok {
            return true;
        }

        // Advance by one char to allow overlapping candidates
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// True if any of `terms` occurs as a whole word in the lowercased text
pub fn contains_any(text_lower: &str, terms: &[String]) -> bool {
    terms
        .iter()
        .any(|term| contains_term_lowered(text_lower, &term.to_lowercase()))
}

/// Lowercased word tokens (letters, digits, apostrophes and hyphens)
pub fn word_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
