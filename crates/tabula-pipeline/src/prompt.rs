//! Prompts for every completion-backed stage.
//!
//! Each stage has a fixed system prompt describing the exact JSON it must
//! return, and a builder for the per-request user prompt.

use tabula_types::{
    ConversationTurn, ExecutionResult, IntentCategory, IntentResult, InterpretationResult,
    QueryRequirements, RetrievedContext, Role, SchemaProfile, Value,
};

/// System prompt for follow-up resolution.
pub const CONTEXT_SYSTEM: &str = r#"You rewrite follow-up questions about a dataset into standalone questions.

Resolve pronouns and ellipsis ("it", "those", "what about X", "and by month?") using the conversation.
If the question already stands on its own, return it unchanged.

Return ONLY JSON:
{"resolved_question": "...", "is_follow_up": true, "topic": "refinement"}

topic is one of: refinement, new_topic, visualization, explanation
"#;

/// System prompt for intent classification.
pub const INTENT_SYSTEM: &str = r#"You classify the analytical intent of a question about a table.

Categories (use exactly one of these names):
- Descriptive: what happened, totals, counts, listings
- Diagnostic: why something happened, causes, drivers
- Comparative: comparing groups, segments or periods
- Trend: change over time
- Predictive: forecasts and projections
- Prescriptive: recommendations and next actions
- Distribution: spread, ranges, histograms
- Correlation: relationships between numeric measures

Return ONLY JSON:
{"category": "Trend", "confidence": 0.9, "required_operations": ["aggregate", "group_by_time"], "needs_time_dimension": true, "needs_comparison": false}
"#;

/// System prompt for requirement extraction.
pub const REQUIREMENTS_SYSTEM: &str = r#"You extract query requirements from a question about a table named `data`.

Rules:
1. Use ONLY column names that appear in the schema, spelled exactly as listed
2. Do not add a grouping column the question does not ask for
3. Aggregation functions: SUM, AVG, COUNT, MIN, MAX (column may be null for COUNT(*))
4. Filter operators: =, !=, >, <, >=, <=, LIKE, IN

Return ONLY JSON:
{
  "required_columns": ["region", "sales"],
  "filters": [{"column": "region", "operator": "=", "value": "East"}],
  "aggregations": [{"function": "SUM", "column": "sales"}],
  "group_by_columns": ["region"],
  "time_range": null,
  "sort_by": {"column": "sum_sales", "descending": true},
  "limit": null
}
"#;

/// System prompt for plan generation.
pub const PLAN_SYSTEM: &str = r#"You write SQLite queries that answer analytical questions about a table named `data`.

Rules:
1. Output a single read-only SELECT statement (CTEs and window functions are allowed)
2. Never use DROP, DELETE, INSERT, UPDATE, ALTER or TRUNCATE
3. Quote column names with double quotes
4. Only reference columns listed in the schema
5. Name aggregate outputs with short snake_case aliases

Return ONLY JSON:
{
  "steps": ["Filter to 2024", "Sum sales per region", "Sort descending"],
  "sql_query": "SELECT \"region\", SUM(\"sales\") AS sum_sales FROM data GROUP BY \"region\" ORDER BY sum_sales DESC",
  "supporting_queries": [{"name": "overall_total", "sql": "SELECT SUM(\"sales\") AS total FROM data"}],
  "expected_columns": ["region", "sum_sales"]
}
"#;

/// System prompt for the semantic self-critique stage.
pub const REVIEW_SYSTEM: &str = r#"You review SQL written to answer a question about a table named `data`.

Check that the query:
- selects every column the question asks about
- aggregates when the question asks for a total, average, count, minimum or maximum
- does not use window functions the question does not need

Return ONLY JSON:
{"answers_question": true, "issues": [], "corrected_sql": null}

When the query is wrong, set answers_question to false and put a corrected SELECT in corrected_sql.
"#;

/// System prompt for targeted SQL repair.
pub const REPAIR_SYSTEM: &str = r#"You repair a failing SQLite query over a table named `data`.

Fix ONLY the reported error. Keep the query read-only and reference only columns in the schema.

Return ONLY JSON:
{"sql": "SELECT ..."}
"#;

/// System prompt for insight synthesis.
pub const INSIGHT_SYSTEM: &str = r#"You explain query results to a business audience.

Rules:
1. Use ONLY numbers that appear in the results or statistics provided
2. Do not speculate beyond the data; say so when the data cannot answer
3. Keep each list to at most three short sentences

Return ONLY JSON:
{
  "direct_answer": "One sentence answering the question",
  "what_data_shows": ["..."],
  "why_it_happened": ["..."],
  "business_implications": ["..."],
  "confidence": 0.8,
  "data_sufficiency": "sufficient"
}

data_sufficiency is one of: sufficient, partial, insufficient
"#;

/// System prompt for chart selection.
pub const VISUALIZATION_SYSTEM: &str = r#"You recommend charts for a query result.

Chart types: Bar, Line, Pie, Scatter, Histogram, KPI, Table
Axes must be column names of the result. Suggest 1 to 3 complementary charts, best first.

Return ONLY JSON:
{"charts": [{"chart_type": "Bar", "x_axis": "region", "y_axis": ["sum_sales"], "title": "Sales by region"}]}
"#;

pub fn build_context_prompt(question: &str, history: &[ConversationTurn]) -> String {
    let mut conversation = String::new();
    for turn in history {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        conversation.push_str(&format!("{}: {}\n", speaker, turn.content));
    }

    format!(
        r#"## Conversation

{conversation}
## Current question

{question}

Rewrite the current question so it can be answered without the conversation."#
    )
}

pub fn build_intent_prompt(question: &str, columns: &[String]) -> String {
    format!(
        r#"Question: {question}

Available columns: {}

Classify the intent."#,
        columns.join(", ")
    )
}

pub fn build_requirements_prompt(
    question: &str,
    intent: &IntentResult,
    schema: &SchemaProfile,
    retrieved: &RetrievedContext,
) -> String {
    format!(
        r#"## Question

{question}

## Intent

{} (time dimension: {}, comparison: {})

## Schema

{}
{}
Extract the requirements."#,
        intent.category,
        intent.needs_time_dimension,
        intent.needs_comparison,
        schema.describe(),
        retrieved.describe(),
    )
}

/// The previous attempt, fed back into generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub sql: String,
    pub error: String,
}

pub struct PlanPromptInput<'a> {
    pub question: &'a str,
    pub intent: &'a IntentResult,
    pub schema: &'a SchemaProfile,
    pub requirements: &'a QueryRequirements,
    pub retrieved: &'a RetrievedContext,
    pub columns: &'a [String],
    pub sample: &'a [Vec<Value>],
    pub feedback: Option<&'a Feedback>,
}

pub fn build_plan_prompt(input: &PlanPromptInput<'_>) -> String {
    let requirements =
        serde_json::to_string_pretty(input.requirements).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!(
        r#"## Question

{}

## Intent

{}

## Schema

{}
## Sample rows

{}
## Requirements

```json
{}
```
"#,
        input.question,
        input.intent.category,
        input.schema.describe(),
        render_rows(input.columns, input.sample, input.sample.len()),
        requirements,
    );

    let context = input.retrieved.describe();
    if !context.is_empty() {
        prompt.push_str("\n## Retrieved context\n\n");
        prompt.push_str(&context);
    }

    if let Some(feedback) = input.feedback {
        prompt.push_str(&format!(
            r#"
## Previous attempt failed

SQL:
{}

Error:
{}

Do not repeat this mistake. Write a different query that avoids the error.
"#,
            feedback.sql, feedback.error
        ));
    }

    if input.intent.category == IntentCategory::Trend {
        prompt.push_str("\nOrder the result by the time column.\n");
    }

    prompt.push_str("\nWrite the analysis plan.");
    prompt
}

pub fn build_review_prompt(question: &str, requirements: &QueryRequirements, sql: &str) -> String {
    let requirements =
        serde_json::to_string(requirements).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"Question: {question}

Requirements: {requirements}

SQL:
{sql}

Does this SQL fully answer the question?"#
    )
}

pub fn build_repair_prompt(
    question: &str,
    schema: &SchemaProfile,
    sql: &str,
    stage: &str,
    error: &str,
) -> String {
    format!(
        r#"Question: {question}

## Schema

{}
## Failing SQL

{sql}

## {stage} error

{error}

Return the repaired query."#,
        schema.describe()
    )
}

pub fn build_insight_prompt(
    question: &str,
    intent: &IntentResult,
    execution: &ExecutionResult,
    interpretation: &InterpretationResult,
) -> String {
    let mut metrics = String::new();
    for (key, value) in &execution.metrics {
        metrics.push_str(&format!("- {}: {}\n", key, format_number(*value)));
    }
    let statistics =
        serde_json::to_string_pretty(interpretation).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"## Question

{question}

## Intent

{}

## Result ({} rows)

{}
## Metrics

{metrics}
## Statistics

```json
{statistics}
```

Explain what the result means."#,
        intent.category,
        execution.row_count,
        render_rows(&execution.columns, &execution.rows, 20),
    )
}

pub fn build_visualization_prompt(
    question: &str,
    intent: &IntentResult,
    execution: &ExecutionResult,
) -> String {
    format!(
        r#"Question: {question}
Intent: {}

Result columns: {}
Rows: {}

{}
Recommend charts."#,
        intent.category,
        execution.columns.join(", "),
        execution.row_count,
        render_rows(&execution.columns, &execution.rows, 5),
    )
}

/// Pipe-separated table of the first `limit` rows.
pub fn render_rows(columns: &[String], rows: &[Vec<Value>], limit: usize) -> String {
    let mut out = columns.join(" | ");
    out.push('\n');
    for row in rows.iter().take(limit) {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    if rows.len() > limit {
        out.push_str(&format!("... {} more rows\n", rows.len() - limit));
    }
    out
}

/// Render a number without float noise: integers bare, others to two places.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.2}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_in_plan_prompt() {
        let schema = SchemaProfile {
            columns: Default::default(),
            row_count: 0,
            derived_relationships: vec![],
            quality_score: 1.0,
        };
        let intent = IntentResult::new(IntentCategory::Descriptive, 0.9);
        let feedback = Feedback {
            sql: "SELECT x FROM data".into(),
            error: "no such column: x".into(),
        };
        let input = PlanPromptInput {
            question: "total sales",
            intent: &intent,
            schema: &schema,
            requirements: &QueryRequirements::default(),
            retrieved: &RetrievedContext::default(),
            columns: &[],
            sample: &[],
            feedback: Some(&feedback),
        };

        let prompt = build_plan_prompt(&input);
        assert!(prompt.contains("no such column: x"));
        assert!(prompt.contains("Do not repeat this mistake"));
    }

    #[test]
    fn test_render_rows_truncates() {
        let rows = vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]];
        let out = render_rows(&["n".to_string()], &rows, 2);
        assert!(out.contains("... 1 more rows"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(600.0), "600");
        assert_eq!(format_number(12.3456), "12.35");
        assert_eq!(format_number(0.5), "0.5");
    }
}
