//! Question intent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Provenance;

/// Closed set of analytical intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentCategory {
    Descriptive,
    Diagnostic,
    Comparative,
    Trend,
    Predictive,
    Prescriptive,
    Distribution,
    Correlation,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 8] = [
        IntentCategory::Descriptive,
        IntentCategory::Diagnostic,
        IntentCategory::Comparative,
        IntentCategory::Trend,
        IntentCategory::Predictive,
        IntentCategory::Prescriptive,
        IntentCategory::Distribution,
        IntentCategory::Correlation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Descriptive => "Descriptive",
            IntentCategory::Diagnostic => "Diagnostic",
            IntentCategory::Comparative => "Comparative",
            IntentCategory::Trend => "Trend",
            IntentCategory::Predictive => "Predictive",
            IntentCategory::Prescriptive => "Prescriptive",
            IntentCategory::Distribution => "Distribution",
            IntentCategory::Correlation => "Correlation",
        }
    }

    /// Case-insensitive lookup against the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }

    /// Intents for which a time-ordered trend note is meaningful.
    pub fn wants_trend(&self) -> bool {
        matches!(
            self,
            IntentCategory::Trend | IntentCategory::Descriptive | IntentCategory::Predictive
        )
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown intent category: {}", s))
    }
}

/// Classified intent of a question. Produced once per question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub category: IntentCategory,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    #[serde(default)]
    pub required_operations: Vec<String>,
    #[serde(default)]
    pub needs_time_dimension: bool,
    #[serde(default)]
    pub needs_comparison: bool,
    #[serde(default)]
    pub classified_by: Provenance,
}

impl IntentResult {
    pub fn new(category: IntentCategory, confidence: f64) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            required_operations: Vec::new(),
            needs_time_dimension: category == IntentCategory::Trend,
            needs_comparison: category == IntentCategory::Comparative,
            classified_by: Provenance::Model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(IntentCategory::parse("trend"), Some(IntentCategory::Trend));
        assert_eq!(
            IntentCategory::parse(" CORRELATION "),
            Some(IntentCategory::Correlation)
        );
        assert_eq!(IntentCategory::parse("forecasting"), None);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(IntentResult::new(IntentCategory::Trend, 1.7).confidence, 1.0);
        assert!(IntentResult::new(IntentCategory::Trend, 0.5).needs_time_dimension);
    }
}
