//! Schema profile types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inferred semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Datetime,
    Boolean,
    Text,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Categorical => "categorical",
            SemanticType::Datetime => "datetime",
            SemanticType::Boolean => "boolean",
            SemanticType::Text => "text",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics for one column.
///
/// `min`/`max`/`avg`/`stddev` are set only for numeric columns and
/// `earliest`/`latest` only for datetime columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub semantic_type: SemanticType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    pub missing_pct: f64,
    pub unique_count: usize,
    pub sample_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stddev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
}

impl ColumnProfile {
    /// One-line description used in prompts and retrieval fragments.
    pub fn describe(&self) -> String {
        let mut line = format!("{} ({})", self.name, self.semantic_type);
        match self.semantic_type {
            SemanticType::Numeric => {
                if let (Some(min), Some(max), Some(avg)) = (self.min, self.max, self.avg) {
                    line.push_str(&format!(" range {}..{}, avg {:.2}", min, max, avg));
                }
            }
            SemanticType::Datetime => {
                if let (Some(a), Some(b)) = (&self.earliest, &self.latest) {
                    line.push_str(&format!(" from {} to {}", a, b));
                }
            }
            _ => {
                line.push_str(&format!(", {} distinct", self.unique_count));
            }
        }
        if !self.sample_values.is_empty() {
            line.push_str(&format!(", e.g. {}", self.sample_values.join(", ")));
        }
        if self.missing_pct > 0.0 {
            line.push_str(&format!(", {:.1}% missing", self.missing_pct));
        }
        line
    }
}

/// A candidate relationship between two columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Column whose values are a strict subset
    pub from_column: String,
    /// Column containing every value of `from_column`
    pub to_column: String,
    pub kind: String,
}

impl Relationship {
    pub const POTENTIAL_FOREIGN_KEY: &'static str = "potential foreign key";
}

/// Deterministic profile of a whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaProfile {
    pub columns: IndexMap<String, ColumnProfile>,
    pub row_count: usize,
    pub derived_relationships: Vec<Relationship>,
    /// `1 - mean(missing_pct) / 100`
    pub quality_score: f64,
}

impl SchemaProfile {
    /// Resolve a column reference against the profile, ignoring case and
    /// surrounding quotes. Returns the canonical column name.
    pub fn resolve_column(&self, reference: &str) -> Option<&str> {
        let cleaned = reference
            .trim()
            .trim_matches(|c| c == '"' || c == '`' || c == '\'' || c == '[' || c == ']');
        self.columns
            .keys()
            .find(|name| name.eq_ignore_ascii_case(cleaned))
            .map(|s| s.as_str())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|s| s.as_str()).collect()
    }

    pub fn columns_of(&self, ty: SemanticType) -> Vec<&str> {
        self.columns
            .values()
            .filter(|c| c.semantic_type == ty)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn semantic_type(&self, column: &str) -> Option<SemanticType> {
        self.columns.get(column).map(|c| c.semantic_type)
    }

    /// Prompt rendering: one line per column.
    pub fn describe(&self) -> String {
        let mut out = format!("Table `data` with {} rows:\n", self.row_count);
        for column in self.columns.values() {
            out.push_str("- ");
            out.push_str(&column.describe());
            out.push('\n');
        }
        for rel in &self.derived_relationships {
            out.push_str(&format!(
                "- {} values are a subset of {} ({})\n",
                rel.from_column, rel.to_column, rel.kind
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, ty: SemanticType) -> ColumnProfile {
        ColumnProfile {
            name: name.to_string(),
            semantic_type: ty,
            declared_type: None,
            missing_pct: 0.0,
            unique_count: 3,
            sample_values: vec![],
            min: None,
            max: None,
            avg: None,
            stddev: None,
            earliest: None,
            latest: None,
        }
    }

    #[test]
    fn test_resolve_column_case_insensitive() {
        let mut columns = IndexMap::new();
        columns.insert("Sales".to_string(), column("Sales", SemanticType::Numeric));
        columns.insert("Region".to_string(), column("Region", SemanticType::Categorical));
        let profile = SchemaProfile {
            columns,
            row_count: 3,
            derived_relationships: vec![],
            quality_score: 1.0,
        };

        assert_eq!(profile.resolve_column("sales"), Some("Sales"));
        assert_eq!(profile.resolve_column("\"REGION\""), Some("Region"));
        assert_eq!(profile.resolve_column("revenue"), None);
        assert_eq!(profile.columns_of(SemanticType::Numeric), vec!["Sales"]);
    }
}
