//! Deterministic statistical interpretation of a result.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlier {
    pub column: String,
    pub row_index: usize,
    pub value: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendNote {
    pub time_column: String,
    pub value_column: String,
    pub direction: TrendDirection,
    pub start_value: f64,
    pub end_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributor {
    pub column: String,
    /// Labels of the top rows, from the first non-numeric column when present
    pub labels: Vec<String>,
    /// Share of the column total held by the top three rows (0.0 - 1.0)
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correlation {
    pub left: String,
    pub right: String,
    pub coefficient: f64,
}

/// Findings computed from an execution result without any model involvement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretationResult {
    pub main_finding: String,
    pub outliers: Vec<Outlier>,
    pub trends: Vec<TrendNote>,
    pub top_contributors: Vec<Contributor>,
    pub correlations: Vec<Correlation>,
    pub warnings: Vec<String>,
}

impl InterpretationResult {
    /// An interpretation with nothing to report beyond a summary line.
    pub fn summary_only(main_finding: impl Into<String>) -> Self {
        Self {
            main_finding: main_finding.into(),
            ..Default::default()
        }
    }

    pub fn has_findings(&self) -> bool {
        !(self.outliers.is_empty()
            && self.trends.is_empty()
            && self.top_contributors.is_empty()
            && self.correlations.is_empty())
    }
}
