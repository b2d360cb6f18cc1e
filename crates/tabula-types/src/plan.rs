//! Analysis plans.

use serde::{Deserialize, Serialize};

use crate::Provenance;

/// Last-resort query returned when the self-correction loop gives up.
pub const FALLBACK_SQL: &str = "SELECT * FROM data LIMIT 10";

/// A secondary query whose output is reported alongside the main result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingQuery {
    pub name: String,
    pub sql: String,
}

/// A plan for answering a question.
///
/// Plans are replaced wholesale on every regeneration, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPlan {
    pub steps: Vec<String>,
    pub sql_query: String,
    #[serde(default)]
    pub supporting_queries: Vec<SupportingQuery>,
    #[serde(default)]
    pub expected_columns: Vec<String>,
    /// Optional embedded post-processing snippet proposed by the model.
    /// It is only screened, never executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_code: Option<String>,
    pub validation_passed: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub is_fallback: bool,
    /// Number of generations spent to arrive at this plan
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub origin: Provenance,
}

impl AnalysisPlan {
    /// A freshly generated plan that has not been validated yet.
    pub fn draft(sql_query: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            steps,
            sql_query: sql_query.into(),
            supporting_queries: Vec::new(),
            expected_columns: Vec::new(),
            python_code: None,
            validation_passed: false,
            validation_errors: Vec::new(),
            is_fallback: false,
            attempts: 0,
            origin: Provenance::Model,
        }
    }

    /// The fixed plan used once retries are exhausted.
    ///
    /// `errors` records why every attempt failed.
    pub fn fallback(errors: Vec<String>, attempts: u32) -> Self {
        Self {
            steps: vec![
                "Plan generation did not converge; returning a preview of the data".to_string(),
            ],
            sql_query: FALLBACK_SQL.to_string(),
            supporting_queries: Vec::new(),
            expected_columns: Vec::new(),
            python_code: None,
            validation_passed: true,
            validation_errors: errors,
            is_fallback: true,
            attempts,
            origin: Provenance::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_plan_is_marked() {
        let plan = AnalysisPlan::fallback(vec!["no such column: x".into()], 3);
        assert_eq!(plan.sql_query, FALLBACK_SQL);
        assert!(plan.validation_passed);
        assert!(plan.is_fallback);
        assert_eq!(plan.origin, Provenance::Fallback);
        assert_eq!(plan.validation_errors.len(), 1);
    }
}
