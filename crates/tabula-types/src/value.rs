//! Cell values and the tabular data a dataset is made of.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Logical table name every generated query refers to.
pub const TABLE_NAME: &str = "data";

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Text is parsed; booleans are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Boolean view of the cell, accepting `true/false/0/1` in any representation.
    pub fn as_bool_like(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::Float(f) if *f == 0.0 => Some(false),
            Value::Float(f) if *f == 1.0 => Some(true),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Datetime view of the cell. Only text cells are considered.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Text(s) => parse_datetime(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%b %d, %Y"];

/// Parse a date or datetime string in one of the common layouts.
///
/// Year-month values such as `2024-03` are read as the first day of the month.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.len() < 7 || !s.starts_with(|c: char| c.is_ascii_digit() || c.is_ascii_alphabetic()) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    // YYYY-MM
    let bytes = s.as_bytes();
    if s.len() == 7 && bytes[4] == b'-' && s[..4].bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// An in-memory table: named columns, optional declared types, and rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabularData {
    pub columns: Vec<String>,
    /// Column name to declared type, as supplied with the dataset
    #[serde(default)]
    pub declared_types: IndexMap<String, String>,
    pub rows: Vec<Vec<Value>>,
}

impl TabularData {
    /// Create a table. Rows are padded with nulls or truncated to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self {
            columns,
            declared_types: IndexMap::new(),
            rows,
        }
    }

    pub fn with_declared_types(mut self, types: IndexMap<String, String>) -> Self {
        self.declared_types = types;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn declared_type(&self, column: &str) -> Option<&str> {
        self.declared_types.get(column).map(|s| s.as_str())
    }

    /// Iterate the cells of one column.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// The first `n` rows, for prompts.
    pub fn head(&self, n: usize) -> &[Vec<Value>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Content hash identifying this version of the data.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for column in &self.columns {
            hasher.update(column.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(self.declared_type(column).unwrap_or("").as_bytes());
            hasher.update(b"\x1e");
        }
        for row in &self.rows {
            for cell in row {
                match cell {
                    Value::Null => hasher.update(b"\x00"),
                    Value::Bool(b) => hasher.update([1, *b as u8]),
                    Value::Int(i) => {
                        hasher.update([2]);
                        hasher.update(i.to_le_bytes());
                    }
                    Value::Float(f) => {
                        hasher.update([3]);
                        hasher.update(f.to_bits().to_le_bytes());
                    }
                    Value::Text(s) => {
                        hasher.update([4]);
                        hasher.update(s.as_bytes());
                    }
                }
                hasher.update(b"\x1f");
            }
            hasher.update(b"\x1e");
        }
        base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            hasher.finalize(),
        )
    }
}

/// A dataset handed to the pipeline: identity plus shared data.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Stable identity; the schema cache is keyed by it
    pub id: String,
    /// Owner, used to scope retrieval
    pub owner: Option<String>,
    pub data: Arc<TabularData>,
    /// Content hash of `data`, computed once
    pub fingerprint: String,
}

impl Dataset {
    pub fn new(id: impl Into<String>, data: TabularData) -> Self {
        Self::from_shared(id, Arc::new(data))
    }

    pub fn from_shared(id: impl Into<String>, data: Arc<TabularData>) -> Self {
        let fingerprint = data.fingerprint();
        Self {
            id: id.into(),
            owner: None,
            data,
            fingerprint,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2024-03-01").is_some());
        assert!(parse_datetime("2024-03-01 12:30:00").is_some());
        assert!(parse_datetime("2024-03-01T12:30:00Z").is_some());
        assert!(parse_datetime("03/15/2024").is_some());
        assert!(parse_datetime("2024-03").is_some());
        assert!(parse_datetime("2024").is_none());
        assert!(parse_datetime("hello").is_none());
        assert!(parse_datetime("12.5").is_none());
    }

    #[test]
    fn test_bool_like() {
        assert_eq!(Value::text("TRUE").as_bool_like(), Some(true));
        assert_eq!(Value::Int(0).as_bool_like(), Some(false));
        assert_eq!(Value::Int(2).as_bool_like(), None);
        assert_eq!(Value::text("yes").as_bool_like(), None);
    }

    #[test]
    fn test_rows_padded_to_width() {
        let table = TabularData::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Int(1)], vec![Value::Int(2), Value::Int(3), Value::Int(4)]],
        );
        assert!(table.rows.iter().all(|r| r.len() == 2));
        assert_eq!(table.rows[0][1], Value::Null);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = TabularData::new(vec!["x".into()], vec![vec![Value::Int(1)]]);
        let b = TabularData::new(vec!["x".into()], vec![vec![Value::Int(1)]]);
        let c = TabularData::new(vec!["x".into()], vec![vec![Value::Int(2)]]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_untagged_json() {
        let row: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            row,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::Float(2.5),
                Value::text("x")
            ]
        );
    }
}
