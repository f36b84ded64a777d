//! Domain-specific admission rules for evidence sentences
//!
//! A gate applies when one of its trigger terms is among the query's X terms.
//! An applicable gate admits a sentence only if the sentence matches a
//! required pattern and matches no excluded pattern the query itself does not
//! mention.

use super::entity_extractor::ExtractedEntities;
use crate::config::DomainGateConfig;
use crate::errors::{AppError, Result};
use regex_lite::Regex;

#[derive(Debug)]
pub struct DomainGate {
    name: String,
    trigger_terms: Vec<String>,
    required: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl DomainGate {
    /// Compile a gate from configuration. Patterns are case-insensitive.
    pub fn from_config(config: &DomainGateConfig) -> Result<Self> {
        if config.trigger_terms.is_empty() {
            return Err(AppError::Configuration {
                message: format!("Domain gate '{}' has no trigger terms", config.name),
            });
        }

        let compile = |pattern: &String| {
            Regex::new(&format!("(?i){}", pattern)).map_err(|e| AppError::Configuration {
                message: format!("Domain gate '{}' pattern '{}': {}", config.name, pattern, e),
            })
        };

        Ok(Self {
            name: config.name.clone(),
            trigger_terms: config.trigger_terms.iter().map(|t| t.to_lowercase()).collect(),
            required: config.required_patterns.iter().map(compile).collect::<Result<_>>()?,
            excluded: config.excluded_patterns.iter().map(compile).collect::<Result<_>>()?,
        })
    }

    /// Compile every configured gate
    pub fn from_configs(configs: &[DomainGateConfig]) -> Result<Vec<Self>> {
        configs.iter().map(Self::from_config).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if a trigger term is among the X terms
    pub fn applies(&self, entities: &ExtractedEntities) -> bool {
        entities
            .x_terms
            .iter()
            .any(|x| self.trigger_terms.iter().any(|t| t.eq_ignore_ascii_case(x)))
    }

    pub fn admits(&self, sentence: &str, query: &str) -> bool {
        if !self.required.is_empty() && !self.required.iter().any(|re| re.is_match(sentence)) {
            return false;
        }

        // An excluded condition is allowed back in when the query asks about it
        !self
            .excluded
            .iter()
            .any(|re| re.is_match(sentence) && !re.is_match(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_domain_gates;

    fn neuro_gate() -> DomainGate {
        DomainGate::from_config(&default_domain_gates()[0]).unwrap()
    }

    fn entities(x_terms: &[&str]) -> ExtractedEntities {
        ExtractedEntities {
            x_terms: x_terms.iter().map(|t| t.to_string()).collect(),
            y_terms: vec!["ad".to_string()],
            disambiguators: Vec::new(),
            is_compositional: true,
            original_query: "inflammation and ad".to_string(),
            matched_pattern: None,
        }
    }

    #[test]
    fn test_applies_on_trigger() {
        let gate = neuro_gate();
        assert!(gate.applies(&entities(&["inflammation", "inflammatory"])));
        assert!(!gate.applies(&entities(&["microplastics"])));
    }

    #[test]
    fn test_requires_neuro_signal() {
        let gate = neuro_gate();
        let query = "effect of inflammation on ad";

        assert!(gate.admits("Microglial activation and IL-6 were elevated in AD brains", query));
        assert!(gate.admits("Neuroinflammation precedes amyloid deposition in AD", query));
        assert!(!gate.admits("Inflamed joints were common among AD patients", query));
    }

    #[test]
    fn test_excluded_conditions() {
        let gate = neuro_gate();

        let sentence = "Inflammatory bowel disease raised cytokine levels and AD risk";
        assert!(!gate.admits(sentence, "effect of inflammation on ad"));
        // Allowed when the query names the excluded condition
        assert!(gate.admits(sentence, "inflammatory bowel disease and ad association"));
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let config = DomainGateConfig {
            name: "broken".to_string(),
            trigger_terms: vec!["x".to_string()],
            required_patterns: vec!["(unclosed".to_string()],
            excluded_patterns: Vec::new(),
        };
        let err = DomainGate::from_config(&config).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
