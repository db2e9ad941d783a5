//! Resolves a description in one month to its counterpart in the previous month.
//!
//! Descriptions are free text and drift between uploads ("Acme Solutions Inc."
//! one month, "ACME  Solution Inc" the next). Matching runs three passes and
//! the first hit wins:
//!
//! 1. exact string equality
//! 2. normalized equality (lowercase, whitespace collapsed, `.` and `,` removed)
//! 3. normalized equality after the configured spelling corrections
//!
//! A miss is a normal outcome: callers treat `None` as "no prior-month
//! comparison available".

use crate::config::{default_corrections, CorrectionRule};
use crate::error::{AgingError, Result};
use crate::schema::Described;
use log::debug;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone)]
struct Correction {
    pattern: Regex,
    replacement: String,
}

impl Correction {
    fn compile(rule: &CorrectionRule) -> Result<Self> {
        let pattern =
            Regex::new(&rule.pattern).map_err(|source| AgingError::InvalidCorrectionPattern {
                pattern: rule.pattern.clone(),
                source,
            })?;
        Ok(Self {
            pattern,
            replacement: rule.replacement.clone(),
        })
    }
}

static DEFAULT_CORRECTIONS: LazyLock<Vec<Correction>> = LazyLock::new(|| {
    default_corrections()
        .iter()
        .filter_map(|rule| Correction::compile(rule).ok())
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Normalized,
    Corrected,
}

#[derive(Debug, Clone)]
pub struct DescriptionMatcher {
    corrections: Vec<Correction>,
}

impl Default for DescriptionMatcher {
    fn default() -> Self {
        Self {
            corrections: DEFAULT_CORRECTIONS.clone(),
        }
    }
}

impl DescriptionMatcher {
    pub fn new(rules: &[CorrectionRule]) -> Result<Self> {
        let corrections = rules
            .iter()
            .map(Correction::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { corrections })
    }

    /// Matcher that only does exact and normalized passes.
    pub fn without_corrections() -> Self {
        Self {
            corrections: Vec::new(),
        }
    }

    pub fn correction_count(&self) -> usize {
        self.corrections.len()
    }

    pub fn normalize(description: &str) -> String {
        let lowered = description.to_lowercase();

        let mut collapsed = String::with_capacity(lowered.len());
        let mut in_whitespace = false;
        for ch in lowered.chars() {
            if ch.is_whitespace() {
                if !in_whitespace {
                    collapsed.push(' ');
                }
                in_whitespace = true;
            } else {
                collapsed.push(ch);
                in_whitespace = false;
            }
        }

        collapsed
            .chars()
            .filter(|c| *c != '.' && *c != ',')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Normalized form with every correction applied in order.
    pub fn canonicalize(&self, description: &str) -> String {
        let mut text = Self::normalize(description);
        for correction in &self.corrections {
            text = correction
                .pattern
                .replace_all(&text, correction.replacement.as_str())
                .into_owned();
        }
        text.trim().to_string()
    }

    pub fn find_match<'a, T: Described>(
        &self,
        description: &str,
        candidates: &'a [T],
    ) -> Option<&'a T> {
        self.find_match_with_kind(description, candidates)
            .map(|(record, _)| record)
    }

    pub fn find_match_with_kind<'a, T: Described>(
        &self,
        description: &str,
        candidates: &'a [T],
    ) -> Option<(&'a T, MatchKind)> {
        if let Some(found) = candidates.iter().find(|c| c.description() == description) {
            return Some((found, MatchKind::Exact));
        }

        let normalized = Self::normalize(description);
        if let Some(found) = candidates
            .iter()
            .find(|c| Self::normalize(c.description()) == normalized)
        {
            debug!(
                "Matched '{}' to '{}' after normalization",
                description,
                found.description()
            );
            return Some((found, MatchKind::Normalized));
        }

        if self.corrections.is_empty() {
            return None;
        }

        let canonical = self.canonicalize(description);
        let found = candidates
            .iter()
            .find(|c| self.canonicalize(c.description()) == canonical)?;
        debug!(
            "Matched '{}' to '{}' after spelling corrections",
            description,
            found.description()
        );
        Some((found, MatchKind::Corrected))
    }
}
