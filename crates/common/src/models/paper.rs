//! Paper record, normalized once at the search boundary

use serde::{Deserialize, Serialize};

/// Title used when the backend returns none
pub const UNTITLED: &str = "Untitled";

/// Raw hit as returned by the search backend.
///
/// Every field is optional; backends disagree on naming and on whether
/// identifiers, years and scores are numbers or strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub pmid: Option<serde_json::Value>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub year: Option<serde_json::Value>,
    #[serde(default)]
    pub score: Option<serde_json::Value>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A candidate paper. Read-only downstream of the search gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Stable identifier: PMID, DOI or URL
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub source: Option<String>,
    pub raw_score: f64,
}

impl Paper {
    /// Normalize a backend hit. `position` only names hits that carry no
    /// identifier at all.
    pub fn from_hit(hit: SearchHit, position: usize) -> Self {
        let id = hit
            .pmid
            .as_ref()
            .and_then(value_as_string)
            .or_else(|| non_empty(hit.doi.clone()))
            .or_else(|| non_empty(hit.url.clone()))
            .or_else(|| hit.id.as_ref().and_then(value_as_string))
            .unwrap_or_else(|| format!("hit-{}", position + 1));

        let title = non_empty(hit.title).unwrap_or_else(|| UNTITLED.to_string());
        let abstract_text = non_empty(hit.abstract_text)
            .or_else(|| non_empty(hit.snippet))
            .unwrap_or_default();

        Self {
            id,
            title,
            abstract_text,
            journal: non_empty(hit.journal),
            year: hit.year.as_ref().and_then(value_as_year),
            source: non_empty(hit.source),
            raw_score: hit.score.as_ref().and_then(value_as_score).unwrap_or(0.0),
        }
    }

    /// Title and abstract as one searchable text
    pub fn full_text(&self) -> String {
        if self.abstract_text.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.abstract_text)
        }
    }

    /// Resolve a browsable URL from the identifier
    pub fn url(&self) -> Option<String> {
        let id = self.id.trim();
        if id.starts_with("http://") || id.starts_with("https://") {
            Some(id.to_string())
        } else if id.starts_with("10.") {
            Some(format!("https://doi.org/{}", id))
        } else if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id))
        } else {
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => non_empty(Some(s.clone())),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_year(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        // "2021", "2021-05-01", "2021 May"
        serde_json::Value::String(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }
}

fn value_as_score(value: &serde_json::Value) -> Option<f64> {
    let score = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    score.filter(|s: &f64| s.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(json: &str) -> SearchHit {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_missing_fields_default() {
        let paper = Paper::from_hit(hit("{}"), 4);
        assert_eq!(paper.id, "hit-5");
        assert_eq!(paper.title, UNTITLED);
        assert_eq!(paper.abstract_text, "");
        assert_eq!(paper.raw_score, 0.0);
        assert!(paper.year.is_none());
    }

    #[test]
    fn test_identifier_precedence() {
        let paper = Paper::from_hit(
            hit(r#"{"pmid": 31234567, "doi": "10.1000/xyz", "title": "T"}"#),
            0,
        );
        assert_eq!(paper.id, "31234567");
        assert_eq!(paper.url().as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/31234567/"));

        let paper = Paper::from_hit(hit(r#"{"pmid": "", "doi": "10.1000/xyz"}"#), 0);
        assert_eq!(paper.id, "10.1000/xyz");
        assert_eq!(paper.url().as_deref(), Some("https://doi.org/10.1000/xyz"));
    }

    #[test]
    fn test_snippet_fallback_and_year_parsing() {
        let paper = Paper::from_hit(
            hit(r#"{"id": "abc", "snippet": "Short text", "year": "2019-03-01", "score": 1.5}"#),
            0,
        );
        assert_eq!(paper.abstract_text, "Short text");
        assert_eq!(paper.year, Some(2019));
        assert_eq!(paper.raw_score, 1.5);
        assert!(paper.url().is_none());
    }

    #[test]
    fn test_score_as_string() {
        let hits: Vec<SearchHit> = serde_json::from_str(
            r#"[{"pmid": 1, "score": "0.8"}, {"pmid": 2, "score": 0.5}, {"pmid": 3, "score": "n/a"}, {"pmid": 4, "score": "NaN"}]"#,
        )
        .unwrap();
        let scores: Vec<f64> = hits
            .into_iter()
            .enumerate()
            .map(|(i, h)| Paper::from_hit(h, i).raw_score)
            .collect();
        assert_eq!(scores, vec![0.8, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_full_text() {
        let paper = Paper::from_hit(hit(r#"{"title": "Title", "abstract": "Body."}"#), 0);
        assert_eq!(paper.full_text(), "Title Body.");
    }
}
