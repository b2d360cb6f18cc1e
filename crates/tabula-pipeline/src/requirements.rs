//! Requirement extraction with strict column grounding.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tabula_llm::{parse_json, CompletionClient, CompletionRequest};
use tabula_types::{
    ground_requirements, AggregateFunction, Aggregation, Filter, IntentResult, Provenance,
    QueryRequirements, RetrievedContext, SchemaProfile, SortSpec, TimeRange,
};
use tracing::{info, warn};

use crate::prompt::{self, REQUIREMENTS_SYSTEM};
use crate::rules;
use crate::stage::{complete, StageError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRequirements {
    #[serde(alias = "requiredColumns")]
    required_columns: Vec<String>,
    filters: Vec<RawFilter>,
    aggregations: Vec<RawAggregation>,
    #[serde(alias = "groupByColumns", alias = "group_by")]
    group_by_columns: Vec<String>,
    #[serde(alias = "timeRange")]
    time_range: Option<TimeRange>,
    #[serde(alias = "sortBy")]
    sort_by: Option<RawSort>,
    limit: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawFilter {
    column: String,
    #[serde(default = "default_operator")]
    operator: String,
    #[serde(default)]
    value: serde_json::Value,
}

fn default_operator() -> String {
    "=".to_string()
}

#[derive(Debug, Deserialize)]
struct RawAggregation {
    function: String,
    #[serde(default)]
    column: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSort {
    column: String,
    #[serde(default)]
    descending: bool,
    #[serde(default)]
    direction: Option<String>,
}

pub struct RequirementExtractor {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl RequirementExtractor {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Extract requirements grounded in `schema`.
    ///
    /// Model-proposed columns that do not exist are stripped and recorded.
    /// When nothing selectable survives, keyword rules take over.
    pub async fn extract(
        &self,
        question: &str,
        intent: &IntentResult,
        schema: &SchemaProfile,
        retrieved: &RetrievedContext,
    ) -> QueryRequirements {
        let requirements = match self.try_extract(question, intent, schema, retrieved).await {
            Ok(req) if !req.has_no_columns() => req,
            Ok(stripped) => {
                warn!(
                    errors = stripped.validation_errors.len(),
                    "no grounded columns left, using rule-based requirements"
                );
                let mut req = rules::extract_requirements(question, intent, schema);
                req.validation_errors = stripped.validation_errors;
                req
            }
            Err(e) => {
                warn!(error = %e, "requirement extraction fell back to rules");
                rules::extract_requirements(question, intent, schema)
            }
        };
        info!(
            columns = requirements.required_columns.len(),
            aggregations = requirements.aggregations.len(),
            group_by = requirements.group_by_columns.len(),
            stripped = requirements.validation_errors.len(),
            by = requirements.derived_by.as_str(),
            "requirements extracted"
        );
        requirements
    }

    async fn try_extract(
        &self,
        question: &str,
        intent: &IntentResult,
        schema: &SchemaProfile,
        retrieved: &RetrievedContext,
    ) -> Result<QueryRequirements, StageError> {
        let request = CompletionRequest::new(prompt::build_requirements_prompt(
            question, intent, schema, retrieved,
        ))
        .system(REQUIREMENTS_SYSTEM)
        .json();
        let text = complete(self.client.as_ref(), request, self.timeout, "requirements").await?;
        let raw: RawRequirements = parse_json(&text)?;

        let mut req = convert(raw);
        ground_requirements(&mut req, schema);

        // Columns used only by aggregates or filters still have to be selected.
        let referenced: Vec<String> = req
            .aggregations
            .iter()
            .filter_map(|a| a.column.clone())
            .chain(req.filters.iter().map(|f| f.column.clone()))
            .collect();
        for column in referenced {
            if !req.required_columns.contains(&column) {
                req.required_columns.push(column);
            }
        }
        Ok(req)
    }
}

fn convert(raw: RawRequirements) -> QueryRequirements {
    let mut errors = Vec::new();

    let filters = raw
        .filters
        .into_iter()
        .filter_map(|f| {
            let filter = Filter {
                column: f.column,
                operator: f.operator.trim().to_ascii_uppercase(),
                value: f.value,
            };
            if filter.has_known_operator() {
                Some(filter)
            } else {
                errors.push(format!("unsupported filter operator: {}", filter.operator));
                None
            }
        })
        .collect();

    let aggregations = raw
        .aggregations
        .into_iter()
        .filter_map(|a| match AggregateFunction::parse(&a.function) {
            Some(function) => {
                let column = a.column.filter(|c| !c.trim().is_empty() && c.trim() != "*");
                Some(Aggregation::new(function, column))
            }
            None => {
                errors.push(format!("unsupported aggregate function: {}", a.function));
                None
            }
        })
        .collect();

    let sort_by = raw.sort_by.map(|s| SortSpec {
        descending: s.descending
            || s.direction
                .as_deref()
                .is_some_and(|d| d.trim().eq_ignore_ascii_case("desc")),
        column: s.column,
    });

    QueryRequirements {
        required_columns: raw.required_columns,
        filters,
        aggregations,
        group_by_columns: raw.group_by_columns,
        time_range: raw.time_range,
        sort_by,
        limit: raw
            .limit
            .and_then(|l| l.as_u64())
            .filter(|l| *l > 0)
            .map(|l| l as usize),
        validation_errors: errors,
        derived_by: Provenance::Model,
    }
}
