//! Plan generation.
//!
//! One generation produces one draft plan. The model path writes SQL from
//! the schema, sample rows and requirements; when it cannot, the draft is
//! built deterministically from the requirements instead. Validation and
//! retries live in [`crate::correction`].

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tabula_llm::{parse_json, CompletionClient, CompletionRequest};
use tabula_types::{
    quote_identifier, AnalysisPlan, Dataset, Filter, IntentResult, Provenance, QueryRequirements,
    RetrievedContext, SchemaProfile, SupportingQuery, TABLE_NAME,
};
use tracing::{debug, warn};

use crate::prompt::{self, Feedback, PlanPromptInput, PLAN_SYSTEM};
use crate::stage::{complete, StageError};

/// Row cap for plain selections without an explicit limit.
const DEFAULT_SELECT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    steps: Vec<String>,
    #[serde(alias = "sqlQuery", alias = "sql")]
    sql_query: String,
    #[serde(default, alias = "supportingQueries")]
    supporting_queries: Vec<SupportingQuery>,
    #[serde(default, alias = "expectedColumns")]
    expected_columns: Vec<String>,
    #[serde(default, alias = "pythonCode")]
    python_code: Option<String>,
}

/// Everything a generation needs to know about the question.
pub struct PlanContext<'a> {
    pub question: &'a str,
    pub intent: &'a IntentResult,
    pub schema: &'a SchemaProfile,
    pub requirements: &'a QueryRequirements,
    pub retrieved: &'a RetrievedContext,
    pub dataset: &'a Dataset,
}

pub struct PlanGenerator {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
    sample_rows: usize,
}

impl PlanGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration, sample_rows: usize) -> Self {
        Self {
            client,
            timeout,
            sample_rows,
        }
    }

    /// Produce one draft plan. Never fails.
    pub async fn generate(
        &self,
        ctx: &PlanContext<'_>,
        feedback: Option<&Feedback>,
        temperature: f32,
    ) -> AnalysisPlan {
        match self.try_generate(ctx, feedback, temperature).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "plan generation fell back to requirement-built SQL");
                deterministic_plan(ctx.requirements)
            }
        }
    }

    async fn try_generate(
        &self,
        ctx: &PlanContext<'_>,
        feedback: Option<&Feedback>,
        temperature: f32,
    ) -> Result<AnalysisPlan, StageError> {
        let data = &ctx.dataset.data;
        let input = PlanPromptInput {
            question: ctx.question,
            intent: ctx.intent,
            schema: ctx.schema,
            requirements: ctx.requirements,
            retrieved: ctx.retrieved,
            columns: &data.columns,
            sample: data.head(self.sample_rows),
            feedback,
        };
        let request = CompletionRequest::new(prompt::build_plan_prompt(&input))
            .system(PLAN_SYSTEM)
            .json()
            .temperature(temperature);
        let text = complete(self.client.as_ref(), request, self.timeout, "plan").await?;
        let raw: RawPlan = parse_json(&text)?;

        let sql = raw.sql_query.trim().trim_end_matches(';').trim().to_string();
        debug!(sql = %sql, "plan drafted");

        let mut plan = AnalysisPlan::draft(sql, raw.steps);
        plan.supporting_queries = raw.supporting_queries;
        plan.expected_columns = raw.expected_columns;
        plan.python_code = raw.python_code.filter(|c| !c.trim().is_empty());
        Ok(plan)
    }
}

/// A plan built directly from grounded requirements, without a model.
pub fn deterministic_plan(req: &QueryRequirements) -> AnalysisPlan {
    let sql = build_sql(req);
    let mut steps = Vec::new();
    if !req.filters.is_empty() || req.time_range.is_some() {
        steps.push("Filter rows".to_string());
    }
    if !req.aggregations.is_empty() {
        let names: Vec<String> = req.aggregations.iter().map(|a| a.alias()).collect();
        if req.group_by_columns.is_empty() {
            steps.push(format!("Compute {}", names.join(", ")));
        } else {
            steps.push(format!(
                "Compute {} per {}",
                names.join(", "),
                req.group_by_columns.join(", ")
            ));
        }
    } else {
        steps.push("Select the requested columns".to_string());
    }
    if let Some(sort) = &req.sort_by {
        steps.push(format!("Sort by {}", sort.column));
    }

    let mut plan = AnalysisPlan::draft(sql, steps);
    plan.expected_columns = expected_columns(req);
    plan.origin = Provenance::Rules;
    plan
}

/// SQL for grounded requirements against the table `data`.
pub fn build_sql(req: &QueryRequirements) -> String {
    let mut select: Vec<String> = Vec::new();
    if req.aggregations.is_empty() {
        select.extend(req.required_columns.iter().map(|c| quote_identifier(c)));
    } else {
        select.extend(req.group_by_columns.iter().map(|c| quote_identifier(c)));
        for agg in &req.aggregations {
            let arg = agg
                .column
                .as_deref()
                .map(quote_identifier)
                .unwrap_or_else(|| "*".to_string());
            select.push(format!("{}({}) AS {}", agg.function.sql_name(), arg, agg.alias()));
        }
    }
    if select.is_empty() {
        select.push("*".to_string());
    }

    let mut sql = format!("SELECT {} FROM {}", select.join(", "), TABLE_NAME);

    let mut conditions: Vec<String> = req.filters.iter().filter_map(render_filter).collect();
    if let Some(range) = &req.time_range {
        let column = quote_identifier(&range.column);
        if let Some(start) = &range.start {
            conditions.push(format!("{} >= {}", column, quote_literal(start)));
        }
        if let Some(end) = &range.end {
            conditions.push(format!("{} <= {}", column, quote_literal(end)));
        }
    }
    if !conditions.is_empty() {
        sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }

    if !req.aggregations.is_empty() && !req.group_by_columns.is_empty() {
        let group: Vec<String> = req.group_by_columns.iter().map(|c| quote_identifier(c)).collect();
        sql.push_str(&format!(" GROUP BY {}", group.join(", ")));
    }

    if let Some(sort) = &req.sort_by {
        sql.push_str(&format!(
            " ORDER BY {}{}",
            quote_identifier(&sort.column),
            if sort.descending { " DESC" } else { "" }
        ));
    }

    let limit = req.limit.or_else(|| {
        (req.aggregations.is_empty() && req.group_by_columns.is_empty())
            .then_some(DEFAULT_SELECT_LIMIT)
    });
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

fn expected_columns(req: &QueryRequirements) -> Vec<String> {
    if req.aggregations.is_empty() {
        return req.required_columns.clone();
    }
    req.group_by_columns
        .iter()
        .cloned()
        .chain(req.aggregations.iter().map(|a| a.alias()))
        .collect()
}

fn render_filter(filter: &Filter) -> Option<String> {
    let column = quote_identifier(&filter.column);
    let operator = filter.operator.trim().to_ascii_uppercase();
    let value = if operator == "IN" {
        match &filter.value {
            serde_json::Value::Array(_) => render_value(&filter.value)?,
            single => format!("({})", render_value(single)?),
        }
    } else {
        render_value(&filter.value)?
    };
    Some(format!("{} {} {}", column, operator, value))
}

fn render_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
        serde_json::Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(quote_literal(s)),
        serde_json::Value::Array(items) => {
            let parts: Option<Vec<String>> = items.iter().map(render_value).collect();
            parts.filter(|p| !p.is_empty()).map(|p| format!("({})", p.join(", ")))
        }
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula_types::{AggregateFunction, Aggregation, SortSpec, TimeRange};

    #[test]
    fn test_sum_without_grouping() {
        let req = QueryRequirements {
            required_columns: vec!["Sales".into()],
            aggregations: vec![Aggregation::new(AggregateFunction::Sum, Some("Sales".into()))],
            ..Default::default()
        };
        assert_eq!(build_sql(&req), "SELECT SUM(\"Sales\") AS sum_sales FROM data");
    }

    #[test]
    fn test_grouped_sorted_limited() {
        let req = QueryRequirements {
            required_columns: vec!["region".into(), "sales".into()],
            aggregations: vec![Aggregation::new(AggregateFunction::Sum, Some("sales".into()))],
            group_by_columns: vec!["region".into()],
            sort_by: Some(SortSpec {
                column: "sum_sales".into(),
                descending: true,
            }),
            limit: Some(3),
            ..Default::default()
        };
        assert_eq!(
            build_sql(&req),
            "SELECT \"region\", SUM(\"sales\") AS sum_sales FROM data GROUP BY \"region\" \
             ORDER BY \"sum_sales\" DESC LIMIT 3"
        );
    }

    #[test]
    fn test_filters_and_time_range() {
        let req = QueryRequirements {
            required_columns: vec!["region".into()],
            filters: vec![
                Filter {
                    column: "region".into(),
                    operator: "in".into(),
                    value: json!(["East", "O'Hare"]),
                },
                Filter {
                    column: "units".into(),
                    operator: ">".into(),
                    value: json!(5),
                },
            ],
            time_range: Some(TimeRange {
                column: "day".into(),
                start: Some("2024-01-01".into()),
                end: None,
            }),
            ..Default::default()
        };
        assert_eq!(
            build_sql(&req),
            "SELECT \"region\" FROM data WHERE \"region\" IN ('East', 'O''Hare') \
             AND \"units\" > 5 AND \"day\" >= '2024-01-01' LIMIT 100"
        );
    }

    #[test]
    fn test_empty_requirements_select_everything() {
        let plan = deterministic_plan(&QueryRequirements::default());
        assert_eq!(plan.sql_query, "SELECT * FROM data LIMIT 100");
        assert_eq!(plan.origin, Provenance::Rules);
    }

    #[test]
    fn test_count_star() {
        let req = QueryRequirements {
            aggregations: vec![Aggregation::new(AggregateFunction::Count, None)],
            group_by_columns: vec!["region".into()],
            ..Default::default()
        };
        let plan = deterministic_plan(&req);
        assert_eq!(
            plan.sql_query,
            "SELECT \"region\", COUNT(*) AS row_count FROM data GROUP BY \"region\""
        );
        assert_eq!(plan.expected_columns, vec!["region", "row_count"]);
    }
}
