//! Column statistics and semantic type inference.

use indexmap::IndexMap;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tabula_types::{ColumnProfile, SchemaProfile, SemanticType, TabularData, Value};

use crate::relationships::detect_relationships;

/// Distinct sample values kept per column.
const SAMPLE_SIZE: usize = 5;

/// Categorical columns have fewer distinct values than this.
const CATEGORICAL_MAX_UNIQUE: usize = 100;

/// ...and a distinct/row ratio below this.
const CATEGORICAL_MAX_RATIO: f64 = 0.5;

/// Profile a whole table.
///
/// Columns are profiled in parallel; output order follows the table.
pub fn profile(data: &TabularData) -> SchemaProfile {
    let profiles: Vec<ColumnProfile> = (0..data.column_count())
        .into_par_iter()
        .map(|i| profile_column(data, i))
        .collect();

    let quality_score = if profiles.is_empty() {
        1.0
    } else {
        let mean_missing =
            profiles.iter().map(|c| c.missing_pct).sum::<f64>() / profiles.len() as f64;
        (1.0 - mean_missing / 100.0).clamp(0.0, 1.0)
    };

    let columns: IndexMap<String, ColumnProfile> = profiles
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

    let derived_relationships = detect_relationships(data, &columns);

    SchemaProfile {
        columns,
        row_count: data.row_count(),
        derived_relationships,
        quality_score,
    }
}

/// Profile the column at `index`.
pub fn profile_column(data: &TabularData, index: usize) -> ColumnProfile {
    let name = data.columns[index].clone();
    let total = data.row_count();
    let present: Vec<&Value> = data.column_values(index).filter(|v| !v.is_null()).collect();

    let missing_pct = if total == 0 {
        0.0
    } else {
        (total - present.len()) as f64 / total as f64 * 100.0
    };

    let mut seen = FxHashSet::default();
    let mut sample_values = Vec::new();
    for value in &present {
        let text = value.to_string();
        if seen.insert(text.clone()) && sample_values.len() < SAMPLE_SIZE {
            sample_values.push(text);
        }
    }
    let unique_count = seen.len();

    let semantic_type = infer_semantic_type(&present, unique_count, total);

    let mut column = ColumnProfile {
        declared_type: data.declared_type(&name).map(String::from),
        name,
        semantic_type,
        missing_pct,
        unique_count,
        sample_values,
        min: None,
        max: None,
        avg: None,
        stddev: None,
        earliest: None,
        latest: None,
    };

    match semantic_type {
        SemanticType::Numeric => {
            let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
            if !numbers.is_empty() {
                let n = numbers.len() as f64;
                let mean = numbers.iter().sum::<f64>() / n;
                let variance = if numbers.len() > 1 {
                    numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
                } else {
                    0.0
                };
                column.min = numbers.iter().copied().reduce(f64::min);
                column.max = numbers.iter().copied().reduce(f64::max);
                column.avg = Some(mean);
                column.stddev = Some(variance.sqrt());
            }
        }
        SemanticType::Datetime => {
            let mut stamps: Vec<_> = present.iter().filter_map(|v| v.as_datetime()).collect();
            stamps.sort();
            column.earliest = stamps.first().map(|d| d.to_string());
            column.latest = stamps.last().map(|d| d.to_string());
        }
        _ => {}
    }

    column
}

/// Decide the semantic type from the non-null values of a column.
pub fn infer_semantic_type(present: &[&Value], unique_count: usize, total: usize) -> SemanticType {
    if present.is_empty() {
        return SemanticType::Text;
    }

    if present
        .iter()
        .all(|v| matches!(v, Value::Text(_)) && v.as_datetime().is_some())
    {
        return SemanticType::Datetime;
    }

    if present.iter().all(|v| v.as_bool_like().is_some()) {
        return SemanticType::Boolean;
    }

    if present.iter().all(|v| v.as_f64().is_some()) {
        return SemanticType::Numeric;
    }

    let ratio = unique_count as f64 / total.max(1) as f64;
    if ratio < CATEGORICAL_MAX_RATIO && unique_count < CATEGORICAL_MAX_UNIQUE {
        return SemanticType::Categorical;
    }

    SemanticType::Text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TabularData {
        let regions = ["east", "west", "north", "east", "west", "east", "north", "east"];
        let rows = regions
            .iter()
            .enumerate()
            .map(|(i, r)| {
                vec![
                    Value::text(format!("2024-01-0{}", i + 1)),
                    Value::text(*r),
                    Value::Int((i as i64 + 1) * 10),
                    Value::Bool(i % 2 == 0),
                    Value::text(format!("note number {}", i)),
                    if i == 0 { Value::Null } else { Value::Float(i as f64 / 2.0) },
                ]
            })
            .collect();
        TabularData::new(
            vec![
                "date".into(),
                "region".into(),
                "sales".into(),
                "promo".into(),
                "note".into(),
                "discount".into(),
            ],
            rows,
        )
    }

    #[test]
    fn test_inference_order() {
        let profile = profile(&table());
        let ty = |c: &str| profile.semantic_type(c).unwrap();
        assert_eq!(ty("date"), SemanticType::Datetime);
        assert_eq!(ty("region"), SemanticType::Categorical);
        assert_eq!(ty("sales"), SemanticType::Numeric);
        assert_eq!(ty("promo"), SemanticType::Boolean);
        assert_eq!(ty("note"), SemanticType::Text);
        assert_eq!(ty("discount"), SemanticType::Numeric);
    }

    #[test]
    fn test_stats_follow_type() {
        let profile = profile(&table());
        let sales = &profile.columns["sales"];
        assert_eq!(sales.min, Some(10.0));
        assert_eq!(sales.max, Some(80.0));
        assert_eq!(sales.avg, Some(45.0));
        assert!(sales.earliest.is_none());

        let date = &profile.columns["date"];
        assert!(date.min.is_none());
        assert_eq!(date.earliest.as_deref(), Some("2024-01-01 00:00:00"));
        assert_eq!(date.latest.as_deref(), Some("2024-01-08 00:00:00"));

        let region = &profile.columns["region"];
        assert_eq!(region.unique_count, 3);
        assert_eq!(region.sample_values, vec!["east", "west", "north"]);
        assert!(region.avg.is_none());
    }

    #[test]
    fn test_missing_and_quality() {
        let profile = profile(&table());
        assert_eq!(profile.columns["discount"].missing_pct, 12.5);
        let expected = 1.0 - (12.5 / 6.0) / 100.0;
        assert!((profile.quality_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_single_value_stddev_is_zero() {
        let data = TabularData::new(vec!["x".into()], vec![vec![Value::Float(3.5)]]);
        let column = profile_column(&data, 0);
        assert_eq!(column.stddev, Some(0.0));
    }

    #[test]
    fn test_empty_table() {
        let data = TabularData::new(vec!["a".into(), "b".into()], vec![]);
        let profile = profile(&data);
        assert_eq!(profile.row_count, 0);
        assert_eq!(profile.columns.len(), 2);
        assert_eq!(profile.quality_score, 1.0);
        assert!(profile
            .columns
            .values()
            .all(|c| c.semantic_type == SemanticType::Text && c.missing_pct == 0.0));
    }

    #[test]
    fn test_profile_is_idempotent() {
        let data = table();
        let a = serde_json::to_string(&profile(&data)).unwrap();
        let b = serde_json::to_string(&profile(&data)).unwrap();
        assert_eq!(a, b);
    }
}
