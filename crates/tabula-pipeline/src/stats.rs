//! Small numeric helpers over result columns.

use std::collections::BTreeMap;
use tabula_types::{ExecutionResult, Value};

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn population_stddev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Pearson correlation coefficient. `None` when either side is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// Columns whose non-null cells are all numbers, with at least one number.
pub fn numeric_columns(result: &ExecutionResult) -> Vec<usize> {
    (0..result.columns.len())
        .filter(|&i| {
            let mut any = false;
            for value in result.column_values(i) {
                if value.is_null() {
                    continue;
                }
                if !value.is_numeric() {
                    return false;
                }
                any = true;
            }
            any
        })
        .collect()
}

/// Columns whose non-null cells all parse as datetimes.
pub fn datetime_columns(result: &ExecutionResult) -> Vec<usize> {
    (0..result.columns.len())
        .filter(|&i| {
            let mut any = false;
            for value in result.column_values(i) {
                if value.is_null() {
                    continue;
                }
                if value.as_datetime().is_none() {
                    return false;
                }
                any = true;
            }
            any
        })
        .collect()
}

/// `(row index, value)` for every numeric cell of a column.
pub fn indexed_values(result: &ExecutionResult, column: usize) -> Vec<(usize, f64)> {
    result
        .rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| row.get(column).and_then(Value::as_f64).map(|v| (i, v)))
        .collect()
}

/// Per numeric column `sum`, `avg`, `min`, `max`, plus `row_count`.
pub fn compute_metrics(result: &ExecutionResult) -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();
    metrics.insert("row_count".to_string(), result.row_count as f64);

    for i in numeric_columns(result) {
        let values: Vec<f64> = indexed_values(result, i).into_iter().map(|(_, v)| v).collect();
        let Some(avg) = mean(&values) else {
            continue;
        };
        let name = &result.columns[i];
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        metrics.insert(format!("{}.sum", name), values.iter().sum());
        metrics.insert(format!("{}.avg", name), avg);
        metrics.insert(format!("{}.min", name), min);
        metrics.insert(format!("{}.max", name), max);
    }
    metrics
}
