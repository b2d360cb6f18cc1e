//! Chart selection.
//!
//! The model proposes charts; every proposal is then checked against the
//! result's columns. A chart naming a column the result does not have is
//! replaced by a table, and trend questions always lead with a line chart.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tabula_llm::{parse_json, CompletionClient, CompletionRequest};
use tabula_types::{ChartType, ExecutionResult, IntentCategory, IntentResult, VisualizationConfig};
use tracing::{debug, warn};

use crate::prompt::{self, VISUALIZATION_SYSTEM};
use crate::stage::{complete, StageError};
use crate::stats::{datetime_columns, numeric_columns};

/// Charts returned at most.
pub const MAX_CHARTS: usize = 3;
/// Pie charts are only proposed for this many slices or fewer.
const MAX_PIE_SLICES: usize = 6;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCharts {
    List(Vec<RawChart>),
    Wrapped {
        #[serde(alias = "visualizations")]
        charts: Vec<RawChart>,
    },
}

#[derive(Debug, Deserialize)]
struct RawChart {
    #[serde(alias = "chartType", alias = "type")]
    chart_type: String,
    #[serde(default, alias = "xAxis", alias = "x")]
    x_axis: Option<String>,
    #[serde(default, alias = "yAxis", alias = "y")]
    y_axis: Option<RawAxis>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAxis {
    One(String),
    Many(Vec<String>),
}

impl RawAxis {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawAxis::One(s) => vec![s],
            RawAxis::Many(v) => v,
        }
    }
}

pub struct VisualizationSelector {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl VisualizationSelector {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Between one and three charts, always valid for `execution`.
    pub async fn select(
        &self,
        question: &str,
        intent: &IntentResult,
        execution: &ExecutionResult,
    ) -> Vec<VisualizationConfig> {
        if !execution.success || execution.columns.is_empty() {
            return vec![VisualizationConfig::table("Result")];
        }

        let proposed = match self.try_select(question, intent, execution).await {
            Ok(charts) if !charts.is_empty() => charts,
            Ok(_) => recommend(intent, execution),
            Err(e) => {
                warn!(error = %e, "chart selection fell back to rules");
                recommend(intent, execution)
            }
        };
        let charts = enforce(proposed, intent, execution);
        debug!(
            charts = ?charts.iter().map(|c| c.chart_type.as_str()).collect::<Vec<_>>(),
            "visualizations selected"
        );
        charts
    }

    async fn try_select(
        &self,
        question: &str,
        intent: &IntentResult,
        execution: &ExecutionResult,
    ) -> Result<Vec<VisualizationConfig>, StageError> {
        let request = CompletionRequest::new(prompt::build_visualization_prompt(question, intent, execution))
            .system(VISUALIZATION_SYSTEM)
            .json();
        let text = complete(self.client.as_ref(), request, self.timeout, "visualization").await?;
        let raw: RawCharts = parse_json(&text)?;
        let raw = match raw {
            RawCharts::List(charts) | RawCharts::Wrapped { charts } => charts,
        };

        Ok(raw
            .into_iter()
            .filter_map(|c| {
                let Some(chart_type) = ChartType::parse(&c.chart_type) else {
                    debug!(chart = %c.chart_type, "unknown chart type dropped");
                    return None;
                };
                let title = c.title.unwrap_or_else(|| chart_type.as_str().to_string());
                Some(
                    VisualizationConfig::new(chart_type, title)
                        .with_axes(c.x_axis, c.y_axis.map(RawAxis::into_vec).unwrap_or_default()),
                )
            })
            .collect())
    }
}

/// Rule-based recommendation from the shape of the result.
pub fn recommend(intent: &IntentResult, execution: &ExecutionResult) -> Vec<VisualizationConfig> {
    let dates = datetime_columns(execution);
    let numeric: Vec<usize> = numeric_columns(execution)
        .into_iter()
        .filter(|i| !dates.contains(i))
        .collect();
    let dimension = (0..execution.columns.len()).find(|i| !numeric.contains(i) && !dates.contains(i));
    let name = |i: usize| execution.columns[i].clone();

    let mut charts = Vec::new();

    if let (Some(&time), Some(&value)) = (dates.first(), numeric.first()) {
        if intent.category.wants_trend() {
            charts.push(line(execution, time, value));
        }
    }

    if execution.row_count == 1 && numeric.len() == 1 {
        let value = name(numeric[0]);
        charts.push(
            VisualizationConfig::new(ChartType::Kpi, value.clone()).with_axes(None, vec![value]),
        );
    }

    if let (Some(dim), Some(&value)) = (dimension, numeric.first()) {
        if execution.row_count > 1 {
            let title = format!("{} by {}", name(value), name(dim));
            charts.push(
                VisualizationConfig::new(ChartType::Bar, title)
                    .with_axes(Some(name(dim)), vec![name(value)]),
            );
            if execution.row_count <= MAX_PIE_SLICES {
                charts.push(
                    VisualizationConfig::new(ChartType::Pie, format!("Share of {}", name(value)))
                        .with_axes(Some(name(dim)), vec![name(value)]),
                );
            }
        }
    }

    if numeric.len() >= 2 && execution.row_count > 1 {
        charts.push(
            VisualizationConfig::new(
                ChartType::Scatter,
                format!("{} vs {}", name(numeric[1]), name(numeric[0])),
            )
            .with_axes(Some(name(numeric[0])), vec![name(numeric[1])]),
        );
    }

    if charts.is_empty() && numeric.len() == 1 && execution.row_count > 1 {
        let value = name(numeric[0]);
        charts.push(
            VisualizationConfig::new(ChartType::Histogram, format!("Distribution of {}", value))
                .with_axes(Some(value), Vec::new()),
        );
    }

    if charts.is_empty() {
        charts.push(VisualizationConfig::table("Result"));
    }
    charts
}

fn line(execution: &ExecutionResult, time: usize, value: usize) -> VisualizationConfig {
    let (time, value) = (execution.columns[time].clone(), execution.columns[value].clone());
    VisualizationConfig::new(ChartType::Line, format!("{} over {}", value, time))
        .with_axes(Some(time), vec![value])
}

/// Make every chart valid for `execution`.
///
/// Charts naming unknown columns become tables. Trend intents get a line
/// chart first. The list is never empty and holds at most [`MAX_CHARTS`].
pub fn enforce(
    charts: Vec<VisualizationConfig>,
    intent: &IntentResult,
    execution: &ExecutionResult,
) -> Vec<VisualizationConfig> {
    let mut charts: Vec<VisualizationConfig> = charts
        .into_iter()
        .map(|chart| {
            let missing: Vec<String> = chart
                .axis_fields()
                .filter(|f| !execution.columns.iter().any(|c| c == f))
                .map(String::from)
                .collect();
            if missing.is_empty() {
                chart
            } else {
                warn!(chart = %chart.chart_type, missing = ?missing, "chart references unknown columns");
                let mut table = VisualizationConfig::table(chart.title);
                table.rejection_reason = Some(format!(
                    "{} chart references unknown column(s): {}",
                    chart.chart_type,
                    missing.join(", ")
                ));
                table
            }
        })
        .collect();

    if intent.category == IntentCategory::Trend {
        match charts.iter().position(|c| c.chart_type == ChartType::Line) {
            Some(0) => {}
            Some(i) => {
                let line_chart = charts.remove(i);
                charts.insert(0, line_chart);
            }
            None => {
                let dates = datetime_columns(execution);
                let numeric: Vec<usize> = numeric_columns(execution)
                    .into_iter()
                    .filter(|i| !dates.contains(i))
                    .collect();
                if let Some(chart) = trend_line(execution, &dates, &numeric) {
                    charts.insert(0, chart);
                }
            }
        }
    }

    if charts.is_empty() {
        charts.push(VisualizationConfig::table("Result"));
    }
    charts.truncate(MAX_CHARTS);
    charts
}

/// A line over the time column, or over the first column when there is none.
fn trend_line(execution: &ExecutionResult, dates: &[usize], numeric: &[usize]) -> Option<VisualizationConfig> {
    let value = *numeric.first()?;
    let time = dates
        .first()
        .copied()
        .or_else(|| (0..execution.columns.len()).find(|i| *i != value))?;
    Some(line(execution, time, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_llm::ScriptedClient;
    use tabula_types::{QueryOutcome, Value};

    fn by_region() -> ExecutionResult {
        ExecutionResult::from_outcome(
            QueryOutcome::ok(
                vec!["region".into(), "total".into()],
                vec![
                    vec![Value::text("east"), Value::Int(300)],
                    vec![Value::text("west"), Value::Int(200)],
                ],
            ),
            1,
        )
    }

    fn by_month() -> ExecutionResult {
        ExecutionResult::from_outcome(
            QueryOutcome::ok(
                vec!["month".into(), "total".into()],
                vec![
                    vec![Value::text("2024-01"), Value::Int(100)],
                    vec![Value::text("2024-02"), Value::Int(150)],
                ],
            ),
            1,
        )
    }

    fn intent(category: IntentCategory) -> IntentResult {
        IntentResult::new(category, 0.9)
    }

    async fn select(response: &str, intent: &IntentResult, execution: &ExecutionResult) -> Vec<VisualizationConfig> {
        VisualizationSelector::new(
            Arc::new(ScriptedClient::with_responses([response])),
            Duration::from_secs(5),
        )
        .select("q", intent, execution)
        .await
    }

    #[tokio::test]
    async fn test_model_charts_accepted() {
        let charts = select(
            r#"{"charts": [{"chart_type": "bar", "x_axis": "region", "y_axis": "total", "title": "Totals"}]}"#,
            &intent(IntentCategory::Comparative),
            &by_region(),
        )
        .await;
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].chart_type, ChartType::Bar);
        assert_eq!(charts[0].y_axis, vec!["total"]);
    }

    #[tokio::test]
    async fn test_unknown_axis_becomes_table() {
        let charts = select(
            r#"[{"chart_type": "Bar", "x_axis": "country", "y_axis": ["total"]}]"#,
            &intent(IntentCategory::Comparative),
            &by_region(),
        )
        .await;
        assert_eq!(charts[0].chart_type, ChartType::Table);
        assert!(charts[0].rejection_reason.as_deref().unwrap().contains("country"));
    }

    #[tokio::test]
    async fn test_trend_leads_with_line() {
        let charts = select(
            r#"{"charts": [{"chart_type": "Bar", "x_axis": "month", "y_axis": ["total"]}, {"chart_type": "Line", "x_axis": "month", "y_axis": ["total"]}]}"#,
            &intent(IntentCategory::Trend),
            &by_month(),
        )
        .await;
        assert_eq!(charts[0].chart_type, ChartType::Line);
        assert_eq!(charts[1].chart_type, ChartType::Bar);

        let charts = select(
            r#"{"charts": [{"chart_type": "Pie", "x_axis": "month", "y_axis": ["total"]}]}"#,
            &intent(IntentCategory::Trend),
            &by_month(),
        )
        .await;
        assert_eq!(charts[0].chart_type, ChartType::Line);
        assert_eq!(charts[0].x_axis.as_deref(), Some("month"));
    }

    #[tokio::test]
    async fn test_failure_uses_rules() {
        let selector = VisualizationSelector::new(Arc::new(ScriptedClient::failing()), Duration::from_secs(5));
        let charts = selector
            .select("q", &intent(IntentCategory::Comparative), &by_region())
            .await;
        assert_eq!(charts[0].chart_type, ChartType::Bar);
        assert_eq!(charts[1].chart_type, ChartType::Pie);

        let charts = selector
            .select("q", &intent(IntentCategory::Trend), &by_month())
            .await;
        assert_eq!(charts[0].chart_type, ChartType::Line);
    }

    #[test]
    fn test_single_value_is_kpi() {
        let result = ExecutionResult::from_outcome(
            QueryOutcome::ok(vec!["total".into()], vec![vec![Value::Int(500)]]),
            1,
        );
        let charts = recommend(&intent(IntentCategory::Descriptive), &result);
        assert_eq!(charts[0].chart_type, ChartType::Kpi);
    }

    #[test]
    fn test_never_empty_and_capped() {
        let failed = ExecutionResult::failed("boom", 0);
        assert_eq!(enforce(vec![], &intent(IntentCategory::Descriptive), &failed).len(), 1);

        let many = vec![VisualizationConfig::table("t"); 5];
        assert_eq!(enforce(many, &intent(IntentCategory::Descriptive), &by_region()).len(), 3);
    }
}
