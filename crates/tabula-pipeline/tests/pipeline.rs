//! End-to-end runs of `Pipeline::analyze` against the SQLite engine.

use std::sync::Arc;
use tabula_llm::{CompletionClient, ScriptedClient};
use tabula_pipeline::prompt::{CONTEXT_SYSTEM, INSIGHT_SYSTEM, PLAN_SYSTEM};
use tabula_pipeline::{Pipeline, PipelineConfig, FALLBACK_PREVIEW};
use tabula_types::{
    ChartType, ConversationTurn, DataSufficiency, Dataset, IntentCategory, Provenance, TabularData,
    Value, FALLBACK_SQL,
};

fn sales() -> Dataset {
    let rows = [
        ("2024-01-01", "east", 120),
        ("2024-01-01", "west", 80),
        ("2024-02-01", "east", 150),
        ("2024-02-01", "west", 90),
        ("2024-03-01", "east", 170),
        ("2024-03-01", "west", 110),
    ]
    .iter()
    .map(|(date, region, sales)| vec![Value::text(*date), Value::text(*region), Value::Int(*sales)])
    .collect();
    Dataset::new(
        "sales",
        TabularData::new(vec!["date".into(), "region".into(), "sales".into()], rows),
    )
}

fn scripted(client: ScriptedClient) -> Pipeline {
    let client: Arc<dyn CompletionClient> = Arc::new(client);
    Pipeline::builder().client(client).build()
}

#[tokio::test]
async fn test_empty_dataset_is_insufficient() {
    let empty = Dataset::new(
        "empty",
        TabularData::new(vec!["name".into(), "city".into(), "note".into()], vec![]),
    );
    let response = Pipeline::offline().analyze("show the data", &empty, None).await;

    assert!(response.execution.success);
    assert_eq!(response.execution.row_count, 0);
    assert_eq!(response.interpretation.main_finding, "0 rows / 3 columns");
    assert_eq!(response.insights.data_sufficiency, DataSufficiency::Insufficient);
    assert!(!response.visualizations.is_empty());
}

#[tokio::test]
async fn test_total_without_grouping() {
    let response = Pipeline::offline().analyze("total sales", &sales(), None).await;

    assert!(response.requirements.group_by_columns.is_empty());
    assert!(response.plan.sql_query.contains("SUM("));
    assert!(response.plan.validation_passed);
    assert_eq!(response.execution.row_count, 1);
    assert_eq!(response.execution.rows[0][0], Value::Int(720));
    assert_eq!(response.visualizations[0].chart_type, ChartType::Kpi);
}

#[tokio::test]
async fn test_trend_leads_with_line_chart() {
    let response = Pipeline::offline()
        .analyze("show the sales trend over time", &sales(), None)
        .await;

    assert_eq!(response.intent.category, IntentCategory::Trend);
    assert_eq!(response.requirements.group_by_columns, vec!["date"]);
    assert_eq!(response.execution.row_count, 3);
    assert_eq!(response.visualizations[0].chart_type, ChartType::Line);
    assert_eq!(response.visualizations[0].x_axis.as_deref(), Some("date"));
    assert!(!response.interpretation.trends.is_empty());
}

#[tokio::test]
async fn test_persistent_bad_plan_falls_back() {
    let pipeline = scripted(
        ScriptedClient::new().when(PLAN_SYSTEM, r#"{"sql_query": "SELECT missing_col FROM data"}"#),
    );
    let response = pipeline.analyze("total sales by region", &sales(), None).await;

    assert!(response.plan.is_fallback);
    assert_eq!(response.plan.sql_query, FALLBACK_SQL);
    assert_eq!(response.plan.attempts, 3);
    assert_eq!(response.plan.validation_errors.len(), 3);
    assert!(!response.execution.success);
    assert!(response.execution.intermediate_results[FALLBACK_PREVIEW].success);
    assert_eq!(response.insights.data_sufficiency, DataSufficiency::Insufficient);
    assert_eq!(response.visualizations[0].chart_type, ChartType::Table);
}

#[tokio::test]
async fn test_forbidden_keyword_never_executes() {
    let pipeline = scripted(ScriptedClient::new().when(PLAN_SYSTEM, r#"{"sql_query": "DROP TABLE data"}"#));
    let data = sales();
    let response = pipeline.analyze("total sales", &data, None).await;

    assert!(response.plan.is_fallback);
    assert!(response
        .plan
        .validation_errors
        .iter()
        .all(|e| e.contains("DROP")));

    // The table is untouched
    let preview = &response.execution.intermediate_results[FALLBACK_PREVIEW];
    assert_eq!(preview.rows.len(), 6);
}

#[tokio::test]
async fn test_ungrounded_number_is_flagged_not_blocked() {
    let pipeline = scripted(ScriptedClient::new().when(
        INSIGHT_SYSTEM,
        r#"{"direct_answer": "Sales reached 9999 this year.", "what_data_shows": ["East leads with 440"],
            "confidence": 0.9, "data_sufficiency": "sufficient"}"#,
    ));
    let response = pipeline.analyze("total sales by region", &sales(), None).await;

    assert!(response.execution.success);
    assert_eq!(response.insights.direct_answer, "Sales reached 9999 this year.");
    assert_eq!(response.insights.grounding_warnings.len(), 1);
    assert!(response.insights.grounding_warnings[0].contains("9999"));
    assert_eq!(response.insights.data_sufficiency, DataSufficiency::Partial);
}

#[tokio::test]
async fn test_repeated_question_hits_plan_cache() {
    let pipeline = Pipeline::offline();
    let data = sales();

    let first = pipeline.analyze("total sales by region", &data, None).await;
    assert_eq!(first.plan.origin, Provenance::Rules);

    let second = pipeline.analyze("Total  sales by REGION", &data, None).await;
    assert_eq!(second.plan.origin, Provenance::Cache);
    assert_eq!(second.plan.sql_query, first.plan.sql_query);
    assert_eq!(second.execution.rows, first.execution.rows);
}

#[tokio::test]
async fn test_plan_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = || {
        PipelineConfig::builder()
            .cache_dir(dir.path())
            .build()
    };
    let data = sales();

    let first = Pipeline::builder().config(config()).build();
    first.analyze("average sales by region", &data, None).await;

    let second = Pipeline::builder().config(config()).build();
    let response = second.analyze("average sales by region", &data, None).await;
    assert_eq!(response.plan.origin, Provenance::Cache);
}

#[tokio::test]
async fn test_follow_up_is_resolved() {
    let pipeline = scripted(ScriptedClient::new().when(
        CONTEXT_SYSTEM,
        r#"{"resolved_question": "total sales by region", "is_follow_up": true, "topic": "refinement"}"#,
    ));
    let history = vec![
        ConversationTurn::user("total sales"),
        ConversationTurn::assistant("Total sales are 720."),
    ];
    let response = pipeline
        .analyze("and by region?", &sales(), Some(history.as_slice()))
        .await;

    assert_eq!(response.question, "and by region?");
    assert!(response.resolved.is_follow_up);
    assert_eq!(response.requirements.group_by_columns, vec!["region"]);
    assert_eq!(response.execution.row_count, 2);
}

#[tokio::test]
async fn test_concurrent_questions_share_state() {
    let pipeline = Arc::new(Pipeline::offline());
    let data = sales();

    let (a, b) = tokio::join!(
        pipeline.analyze("total sales", &data, None),
        pipeline.analyze("average sales by region", &data, None),
    );
    assert!(a.execution.success);
    assert!(b.execution.success);
    assert!(Arc::ptr_eq(&a.schema, &b.schema));
}

#[tokio::test]
async fn test_reasoning_steps_in_order() {
    let response = Pipeline::offline().analyze("total sales", &sales(), None).await;
    let steps = &response.reasoning_steps;

    let position = |prefix: &str| steps.iter().position(|s| s.starts_with(prefix));
    let intent = position("Classified intent").unwrap();
    let profile = position("Profiled").unwrap();
    let attempt = position("Attempt 1").unwrap();
    let charts = position("Recommended").unwrap();
    assert!(intent < profile && profile < attempt && attempt < charts);
}
