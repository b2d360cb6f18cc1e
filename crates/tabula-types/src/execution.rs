//! Query execution results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Value;

/// What the query engine returns for one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutcome {
    pub success: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn ok(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            success: true,
            columns,
            rows,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// The executed main query of a plan, plus supporting outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub rows: Vec<Vec<Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    /// Derived numbers such as `sales.sum`; also used for grounding
    pub metrics: BTreeMap<String, f64>,
    /// Supporting-query outputs keyed by name
    pub intermediate_results: BTreeMap<String, QueryOutcome>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn from_outcome(outcome: QueryOutcome, elapsed_ms: u64) -> Self {
        let row_count = outcome.rows.len();
        Self {
            success: outcome.success,
            rows: outcome.rows,
            columns: outcome.columns,
            row_count,
            metrics: BTreeMap::new(),
            intermediate_results: BTreeMap::new(),
            elapsed_ms,
            error: outcome.error,
        }
    }

    pub fn failed(error: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            elapsed_ms,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Every number present in the result: cells, metrics and supporting outputs.
    pub fn numbers(&self) -> Vec<f64> {
        let mut out: Vec<f64> = self.rows.iter().flatten().filter_map(Value::as_f64).collect();
        out.extend(self.metrics.values().copied());
        for outcome in self.intermediate_results.values() {
            out.extend(outcome.rows.iter().flatten().filter_map(Value::as_f64));
        }
        out.push(self.row_count as f64);
        out.push(self.columns.len() as f64);
        out
    }
}
