//! Structured query requirements extracted from a question.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Provenance;

/// Aggregate functions the pipeline knows how to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    /// Lenient parse of function names a model might emit.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" | "total" => Some(AggregateFunction::Sum),
            "avg" | "average" | "mean" => Some(AggregateFunction::Avg),
            "count" | "count_distinct" => Some(AggregateFunction::Count),
            "min" | "minimum" => Some(AggregateFunction::Min),
            "max" | "maximum" => Some(AggregateFunction::Max),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// An aggregation over a column, or `COUNT(*)` when `column` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub function: AggregateFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Aggregation {
    pub fn new(function: AggregateFunction, column: Option<String>) -> Self {
        Self { function, column }
    }

    /// Output alias for the aggregate, e.g. `sum_sales` or `row_count`.
    pub fn alias(&self) -> String {
        match &self.column {
            Some(col) => format!(
                "{}_{}",
                self.function.sql_name().to_ascii_lowercase(),
                sanitize_identifier(col)
            ),
            None => "row_count".to_string(),
        }
    }
}

/// A row filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub column: String,
    pub operator: String,
    pub value: serde_json::Value,
}

impl Filter {
    pub const OPERATORS: [&'static str; 9] = ["=", "!=", "<>", ">", "<", ">=", "<=", "LIKE", "IN"];

    pub fn has_known_operator(&self) -> bool {
        let op = self.operator.trim().to_ascii_uppercase();
        Self::OPERATORS.contains(&op.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// What a query must select, filter, group and aggregate.
///
/// After grounding, every column referenced here exists in the active
/// schema profile. References that did not are listed in `validation_errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequirements {
    pub required_columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub aggregations: Vec<Aggregation>,
    pub group_by_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub derived_by: Provenance,
}

impl QueryRequirements {
    /// True when grounding left nothing to select or group by.
    pub fn has_no_columns(&self) -> bool {
        self.required_columns.is_empty() && self.group_by_columns.is_empty()
    }
}

/// Make a column name safe to embed in an alias.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    out.trim_matches('_').to_string()
}

/// Quote an identifier for SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias() {
        let agg = Aggregation::new(AggregateFunction::Sum, Some("Unit Price".into()));
        assert_eq!(agg.alias(), "sum_unit_price");
        assert_eq!(
            Aggregation::new(AggregateFunction::Count, None).alias(),
            "row_count"
        );
    }

    #[test]
    fn test_parse_function_names() {
        assert_eq!(AggregateFunction::parse("average"), Some(AggregateFunction::Avg));
        assert_eq!(AggregateFunction::parse("SUM"), Some(AggregateFunction::Sum));
        assert_eq!(AggregateFunction::parse("median"), None);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("Sales"), "\"Sales\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
