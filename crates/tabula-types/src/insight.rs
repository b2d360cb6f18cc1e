//! Narrative insights.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Provenance;

/// How well the data supports the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSufficiency {
    Sufficient,
    Partial,
    Insufficient,
}

impl DataSufficiency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sufficient" => Some(DataSufficiency::Sufficient),
            "partial" => Some(DataSufficiency::Partial),
            "insufficient" => Some(DataSufficiency::Insufficient),
            _ => None,
        }
    }

    /// One step lower.
    pub fn degrade(self) -> Self {
        match self {
            DataSufficiency::Sufficient => DataSufficiency::Partial,
            _ => DataSufficiency::Insufficient,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSufficiency::Sufficient => "sufficient",
            DataSufficiency::Partial => "partial",
            DataSufficiency::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for DataSufficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four-part narrative answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub direct_answer: String,
    pub what_data_shows: Vec<String>,
    pub why_it_happened: Vec<String>,
    pub business_implications: Vec<String>,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    pub data_sufficiency: DataSufficiency,
    /// Numbers in the narrative that could not be traced to the result
    #[serde(default)]
    pub grounding_warnings: Vec<String>,
    #[serde(default)]
    pub generated_by: Provenance,
}

impl Insights {
    /// All narrative text, for grounding checks.
    pub fn narrative(&self) -> Vec<&str> {
        std::iter::once(self.direct_answer.as_str())
            .chain(self.what_data_shows.iter().map(|s| s.as_str()))
            .chain(self.why_it_happened.iter().map(|s| s.as_str()))
            .chain(self.business_implications.iter().map(|s| s.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrade_bottoms_out() {
        assert_eq!(DataSufficiency::Sufficient.degrade(), DataSufficiency::Partial);
        assert_eq!(DataSufficiency::Partial.degrade(), DataSufficiency::Insufficient);
        assert_eq!(
            DataSufficiency::Insufficient.degrade(),
            DataSufficiency::Insufficient
        );
    }
}
