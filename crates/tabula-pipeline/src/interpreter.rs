//! Deterministic statistical interpretation.
//!
//! Everything here is computed from the result rows. No completion calls,
//! and no input can make it fail: empty or failed results produce an
//! explicit summary instead.

use tabula_types::{
    Contributor, Correlation, ExecutionResult, IntentResult, InterpretationResult, Outlier,
    TrendDirection, TrendNote,
};
use tracing::debug;

use crate::prompt::format_number;
use crate::stats::{datetime_columns, indexed_values, mean, numeric_columns, pearson, population_stddev};

/// |z| above which a value is an outlier.
pub const OUTLIER_Z: f64 = 2.5;
/// Minimum non-null values before outliers are looked for.
pub const OUTLIER_MIN_VALUES: usize = 6;
/// Share of the total the top three rows must exceed.
pub const CONTRIBUTOR_SHARE: f64 = 0.5;
/// |r| at or above which a correlation is reported.
pub const CORRELATION_R: f64 = 0.7;
const CORRELATION_MIN_ROWS: usize = 3;
/// Relative change below which a trend is flat, in percent.
const FLAT_PCT: f64 = 1.0;

pub fn interpret(execution: &ExecutionResult, intent: &IntentResult) -> InterpretationResult {
    if !execution.success {
        let mut result = InterpretationResult::summary_only("The query did not produce a result");
        result.warnings.push(format!(
            "no interpretation: {}",
            execution.error.as_deref().unwrap_or("execution failed")
        ));
        return result;
    }

    let dates = datetime_columns(execution);
    let numeric: Vec<usize> = numeric_columns(execution)
        .into_iter()
        .filter(|i| !dates.contains(i))
        .collect();

    let mut result = InterpretationResult {
        outliers: numeric.iter().flat_map(|&c| outliers(execution, c)).collect(),
        top_contributors: numeric
            .iter()
            .filter_map(|&c| contributors(execution, c, &numeric))
            .collect(),
        correlations: correlations(execution, &numeric),
        ..Default::default()
    };

    if intent.category.wants_trend() {
        if let (Some(&time), Some(&value)) = (dates.first(), numeric.first()) {
            result.trends.extend(trend(execution, time, value));
        }
    }

    if execution.row_count == 0 {
        result.warnings.push("the query returned no rows".to_string());
    } else if numeric.is_empty() {
        result.warnings.push("no numeric columns in the result".to_string());
    }

    result.main_finding = main_finding(execution, &result);
    debug!(
        outliers = result.outliers.len(),
        trends = result.trends.len(),
        contributors = result.top_contributors.len(),
        correlations = result.correlations.len(),
        "result interpreted"
    );
    result
}

fn outliers(execution: &ExecutionResult, column: usize) -> Vec<Outlier> {
    let values = indexed_values(execution, column);
    if values.len() < OUTLIER_MIN_VALUES {
        return Vec::new();
    }
    let plain: Vec<f64> = values.iter().map(|(_, v)| *v).collect();
    let (Some(avg), Some(sd)) = (mean(&plain), population_stddev(&plain)) else {
        return Vec::new();
    };
    if sd == 0.0 {
        return Vec::new();
    }
    values
        .into_iter()
        .filter_map(|(row, v)| {
            let z = (v - avg) / sd;
            (z.abs() > OUTLIER_Z).then(|| Outlier {
                column: execution.columns[column].clone(),
                row_index: row,
                value: v,
                z_score: z,
            })
        })
        .collect()
}

fn contributors(execution: &ExecutionResult, column: usize, numeric: &[usize]) -> Option<Contributor> {
    let mut values = indexed_values(execution, column);
    if values.len() < 2 || values.iter().any(|(_, v)| *v < 0.0) {
        return None;
    }
    let total: f64 = values.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return None;
    }
    values.sort_by(|a, b| b.1.total_cmp(&a.1));
    let top = &values[..values.len().min(3)];
    let share = top.iter().map(|(_, v)| v).sum::<f64>() / total;
    if share <= CONTRIBUTOR_SHARE {
        return None;
    }

    let label_column = (0..execution.columns.len()).find(|i| !numeric.contains(i));
    let labels = top
        .iter()
        .map(|(row, _)| {
            label_column
                .and_then(|c| execution.rows[*row].get(c))
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .unwrap_or_else(|| format!("row {}", row + 1))
        })
        .collect();

    Some(Contributor {
        column: execution.columns[column].clone(),
        labels,
        share,
    })
}

fn trend(execution: &ExecutionResult, time: usize, value: usize) -> Option<TrendNote> {
    let mut points: Vec<_> = execution
        .rows
        .iter()
        .filter_map(|row| {
            let t = row.get(time)?.as_datetime()?;
            let v = row.get(value)?.as_f64()?;
            Some((t, v))
        })
        .collect();
    if points.len() < 2 {
        return None;
    }
    points.sort_by_key(|(t, _)| *t);

    let start = points[0].1;
    let end = points[points.len() - 1].1;
    let change_pct = (start != 0.0).then(|| (end - start) / start.abs() * 100.0);
    let direction = match change_pct {
        Some(pct) if pct.abs() < FLAT_PCT => TrendDirection::Flat,
        Some(pct) if pct > 0.0 => TrendDirection::Increasing,
        Some(_) => TrendDirection::Decreasing,
        None if end > start => TrendDirection::Increasing,
        None if end < start => TrendDirection::Decreasing,
        None => TrendDirection::Flat,
    };

    Some(TrendNote {
        time_column: execution.columns[time].clone(),
        value_column: execution.columns[value].clone(),
        direction,
        start_value: start,
        end_value: end,
        change_pct,
    })
}

fn correlations(execution: &ExecutionResult, numeric: &[usize]) -> Vec<Correlation> {
    let mut out = Vec::new();
    for (i, &left) in numeric.iter().enumerate() {
        for &right in &numeric[i + 1..] {
            let (xs, ys): (Vec<f64>, Vec<f64>) = execution
                .rows
                .iter()
                .filter_map(|row| Some((row.get(left)?.as_f64()?, row.get(right)?.as_f64()?)))
                .unzip();
            if xs.len() < CORRELATION_MIN_ROWS {
                continue;
            }
            if let Some(r) = pearson(&xs, &ys) {
                if r.abs() >= CORRELATION_R {
                    out.push(Correlation {
                        left: execution.columns[left].clone(),
                        right: execution.columns[right].clone(),
                        coefficient: r,
                    });
                }
            }
        }
    }
    out
}

/// Contributors first, then outliers, then trends, then a plain summary.
fn main_finding(execution: &ExecutionResult, result: &InterpretationResult) -> String {
    if let Some(c) = result.top_contributors.first() {
        return format!(
            "{} account for {}% of total {}",
            c.labels.join(", "),
            format_number(c.share * 100.0),
            c.column
        );
    }
    if let Some(o) = result.outliers.first() {
        return format!(
            "{} outlier(s) found; {} = {} is {} standard deviations from the mean",
            result.outliers.len(),
            o.column,
            format_number(o.value),
            format_number(o.z_score.abs())
        );
    }
    if let Some(t) = result.trends.first() {
        let direction = match t.direction {
            TrendDirection::Increasing => "increased",
            TrendDirection::Decreasing => "decreased",
            TrendDirection::Flat => "stayed flat",
        };
        let change = t
            .change_pct
            .map(|p| format!(" ({}%)", format_number(p)))
            .unwrap_or_default();
        return format!(
            "{} {} from {} to {}{}",
            t.value_column,
            direction,
            format_number(t.start_value),
            format_number(t.end_value),
            change
        );
    }
    format!("{} rows / {} columns", execution.row_count, execution.columns.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_types::{IntentCategory, QueryOutcome, Value};

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> ExecutionResult {
        ExecutionResult::from_outcome(
            QueryOutcome::ok(columns.iter().map(|c| c.to_string()).collect(), rows),
            1,
        )
    }

    fn intent(category: IntentCategory) -> IntentResult {
        IntentResult::new(category, 0.9)
    }

    #[test]
    fn test_empty_result() {
        let r = result(&["a", "b", "c"], vec![]);
        let out = interpret(&r, &intent(IntentCategory::Descriptive));
        assert_eq!(out.main_finding, "0 rows / 3 columns");
        assert!(!out.has_findings());
    }

    #[test]
    fn test_failed_result() {
        let out = interpret(
            &ExecutionResult::failed("no such column: x", 0),
            &intent(IntentCategory::Descriptive),
        );
        assert!(out.warnings[0].contains("no such column"));
    }

    #[test]
    fn test_outlier_detected() {
        let mut rows: Vec<Vec<Value>> = (0..19).map(|_| vec![Value::Int(10)]).collect();
        rows.push(vec![Value::Int(100)]);
        let out = interpret(&result(&["v"], rows), &intent(IntentCategory::Diagnostic));

        assert!(out.top_contributors.is_empty());
        assert_eq!(out.outliers.len(), 1);
        assert_eq!(out.outliers[0].row_index, 19);
        assert!(out.outliers[0].z_score > 2.5);
        assert!(out.main_finding.starts_with("1 outlier(s)"));
    }

    #[test]
    fn test_too_few_values_for_outliers() {
        let rows = vec![
            vec![Value::Int(1)],
            vec![Value::Int(1)],
            vec![Value::Int(1)],
            vec![Value::Int(500)],
        ];
        let out = interpret(&result(&["v"], rows), &intent(IntentCategory::Diagnostic));
        assert!(out.outliers.is_empty());
    }

    #[test]
    fn test_top_contributors_take_priority() {
        let rows = vec![
            vec![Value::text("east"), Value::Int(500)],
            vec![Value::text("west"), Value::Int(300)],
            vec![Value::text("north"), Value::Int(100)],
            vec![Value::text("south"), Value::Int(50)],
            vec![Value::text("central"), Value::Int(50)],
        ];
        let out = interpret(&result(&["region", "sales"], rows), &intent(IntentCategory::Descriptive));

        let c = &out.top_contributors[0];
        assert_eq!(c.labels, vec!["east", "west", "north"]);
        assert!((c.share - 0.9).abs() < 1e-9);
        assert_eq!(out.main_finding, "east, west, north account for 90% of total sales");
    }

    #[test]
    fn test_negative_values_skip_contributors() {
        let rows = vec![vec![Value::Int(-5)], vec![Value::Int(10)]];
        let out = interpret(&result(&["delta"], rows), &intent(IntentCategory::Descriptive));
        assert!(out.top_contributors.is_empty());
    }

    #[test]
    fn test_trend_sorted_by_time() {
        let rows = vec![
            vec![Value::text("2024-03-01"), Value::Int(150)],
            vec![Value::text("2024-01-01"), Value::Int(100)],
            vec![Value::text("2024-02-01"), Value::Int(120)],
        ];
        let r = result(&["month", "sales"], rows);

        let out = interpret(&r, &intent(IntentCategory::Trend));
        let t = &out.trends[0];
        assert_eq!(t.direction, TrendDirection::Increasing);
        assert_eq!(t.start_value, 100.0);
        assert_eq!(t.end_value, 150.0);
        assert_eq!(t.change_pct, Some(50.0));

        let out = interpret(&r, &intent(IntentCategory::Comparative));
        assert!(out.trends.is_empty());
    }

    #[test]
    fn test_correlation_reported() {
        let rows = (1..=5)
            .map(|i| vec![Value::Int(i), Value::Int(i * 2 + 1), Value::Int(if i % 2 == 0 { 3 } else { 4 })])
            .collect();
        let out = interpret(&result(&["a", "b", "c"], rows), &intent(IntentCategory::Correlation));
        assert_eq!(out.correlations.len(), 1);
        assert_eq!(out.correlations[0].left, "a");
        assert_eq!(out.correlations[0].right, "b");
        assert!((out.correlations[0].coefficient - 1.0).abs() < 1e-9);
    }
}
