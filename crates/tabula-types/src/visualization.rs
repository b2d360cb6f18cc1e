//! Chart recommendations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed chart vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Histogram,
    #[serde(rename = "KPI")]
    Kpi,
    Table,
}

impl ChartType {
    pub const ALL: [ChartType; 7] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Pie,
        ChartType::Scatter,
        ChartType::Histogram,
        ChartType::Kpi,
        ChartType::Table,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "Bar",
            ChartType::Line => "Line",
            ChartType::Pie => "Pie",
            ChartType::Scatter => "Scatter",
            ChartType::Histogram => "Histogram",
            ChartType::Kpi => "KPI",
            ChartType::Table => "Table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationConfig {
    pub chart_type: ChartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axis: Vec<String>,
    pub title: String,
    /// Why the proposed chart was replaced by a table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl VisualizationConfig {
    pub fn new(chart_type: ChartType, title: impl Into<String>) -> Self {
        Self {
            chart_type,
            x_axis: None,
            y_axis: Vec::new(),
            title: title.into(),
            rejection_reason: None,
        }
    }

    pub fn table(title: impl Into<String>) -> Self {
        Self::new(ChartType::Table, title)
    }

    pub fn with_axes(mut self, x: Option<String>, y: Vec<String>) -> Self {
        self.x_axis = x;
        self.y_axis = y;
        self
    }

    /// All axis fields this config refers to.
    pub fn axis_fields(&self) -> impl Iterator<Item = &str> {
        self.x_axis
            .iter()
            .map(|s| s.as_str())
            .chain(self.y_axis.iter().map(|s| s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_type_serde() {
        assert_eq!(serde_json::to_string(&ChartType::Kpi).unwrap(), "\"KPI\"");
        assert_eq!(ChartType::parse("line"), Some(ChartType::Line));
        assert_eq!(ChartType::parse("donut"), None);
    }
}
