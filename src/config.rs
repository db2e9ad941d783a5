use crate::error::Result;
use crate::matcher::DescriptionMatcher;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tolerance used when comparing a forecast grand total against its target.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Percentage below which a difference is displayed as "no change".
pub const DEFAULT_NEGLIGIBLE_PERCENTAGE: f64 = 0.1;

/// One substitution applied to normalized descriptions before comparing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRule {
    /// Regular expression matched against the lowercased, normalized description.
    pub pattern: String,
    pub replacement: String,
}

impl CorrectionRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Spelling variants seen in uploaded descriptions. Applied in order.
pub fn default_corrections() -> Vec<CorrectionRule> {
    vec![
        CorrectionRule::new("sloutions", "solutions"),
        CorrectionRule::new("solutions?", "solutions"),
        CorrectionRule::new("transportation", "transport"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub tolerance: f64,
    pub negligible_percentage: f64,
    pub corrections: Vec<CorrectionRule>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            negligible_percentage: DEFAULT_NEGLIGIBLE_PERCENTAGE,
            corrections: default_corrections(),
        }
    }
}

impl ReconciliationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Compiles the correction list into a matcher.
    pub fn matcher(&self) -> Result<DescriptionMatcher> {
        DescriptionMatcher::new(&self.corrections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config = ReconciliationConfig::from_json_str(r#"{ "tolerance": 0.5 }"#).unwrap();
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.negligible_percentage, DEFAULT_NEGLIGIBLE_PERCENTAGE);
        assert_eq!(config.corrections, default_corrections());
    }

    #[test]
    fn test_custom_corrections_replace_defaults() {
        let json = r#"{ "corrections": [ { "pattern": "intl", "replacement": "international" } ] }"#;
        let config = ReconciliationConfig::from_json_str(json).unwrap();
        assert_eq!(config.corrections.len(), 1);

        let matcher = config.matcher().unwrap();
        assert_eq!(matcher.canonicalize("Acme Intl."), "acme international");
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let json = r#"{ "corrections": [ { "pattern": "(unclosed", "replacement": "x" } ] }"#;
        let config = ReconciliationConfig::from_json_str(json).unwrap();
        assert!(config.matcher().is_err());
    }
}
