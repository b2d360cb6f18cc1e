//! Subset-based candidate foreign keys between categorical columns.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tabula_types::{ColumnProfile, Relationship, SemanticType, TabularData};

/// Cap on reported relationships.
pub const MAX_RELATIONSHIPS: usize = 5;

/// Distinct-value bounds (exclusive) for a column to take part.
const MIN_CARDINALITY: usize = 5;
const MAX_CARDINALITY: usize = 1000;

/// Flag every pair of categorical columns where one value set is a strict
/// subset of the other.
pub fn detect_relationships(
    data: &TabularData,
    columns: &IndexMap<String, ColumnProfile>,
) -> Vec<Relationship> {
    let candidates: Vec<(&str, FxHashSet<String>)> = data
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            columns.get(name.as_str()).is_some_and(|c| {
                c.semantic_type == SemanticType::Categorical
                    && c.unique_count > MIN_CARDINALITY
                    && c.unique_count < MAX_CARDINALITY
            })
        })
        .map(|(i, name)| {
            let values = data
                .column_values(i)
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect();
            (name.as_str(), values)
        })
        .collect();

    let mut found = Vec::new();
    for (from, from_values) in &candidates {
        for (to, to_values) in &candidates {
            if from == to {
                continue;
            }
            if from_values.len() < to_values.len() && from_values.is_subset(to_values) {
                found.push(Relationship {
                    from_column: from.to_string(),
                    to_column: to.to_string(),
                    kind: Relationship::POTENTIAL_FOREIGN_KEY.to_string(),
                });
                if found.len() == MAX_RELATIONSHIPS {
                    return found;
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile;
    use tabula_types::Value;

    /// 40 rows: `store` cycles over 8 ids, `active_store` over the first 6.
    fn stores() -> TabularData {
        let rows = (0..40)
            .map(|i| {
                vec![
                    Value::text(format!("S{}", i % 8)),
                    Value::text(format!("S{}", i % 6)),
                    Value::text(format!("C{}", i % 7)),
                ]
            })
            .collect();
        TabularData::new(
            vec!["store".into(), "active_store".into(), "city".into()],
            rows,
        )
    }

    #[test]
    fn test_strict_subset_detected() {
        let profile = profile(&stores());
        assert_eq!(profile.derived_relationships.len(), 1);
        let rel = &profile.derived_relationships[0];
        assert_eq!(rel.from_column, "active_store");
        assert_eq!(rel.to_column, "store");
        assert_eq!(rel.kind, Relationship::POTENTIAL_FOREIGN_KEY);
    }

    #[test]
    fn test_low_cardinality_ignored() {
        let rows = (0..20)
            .map(|i| vec![Value::text(format!("a{}", i % 3)), Value::text(format!("a{}", i % 4))])
            .collect();
        let data = TabularData::new(vec!["x".into(), "y".into()], rows);
        assert!(profile(&data).derived_relationships.is_empty());
    }

    #[test]
    fn test_result_is_capped() {
        // Nested value sets: c0 ⊂ c1 ⊂ ... ⊂ c5, all with cardinality 6..=11
        let rows = (0..60)
            .map(|i| {
                (0..6)
                    .map(|k| Value::text(format!("v{}", i % (6 + k))))
                    .collect()
            })
            .collect();
        let columns = (0..6).map(|k| format!("c{}", k)).collect();
        let data = TabularData::new(columns, rows);
        assert_eq!(profile(&data).derived_relationships.len(), MAX_RELATIONSHIPS);
    }
}
