//! CSV loading.

use std::path::Path;
use tabula_types::{Dataset, TabularData, Value};

/// Load a CSV file with a header row.
///
/// Empty cells become nulls, integer and float cells are typed, everything
/// else stays text. The dataset id is the file stem.
pub(crate) fn load_csv(path: &Path) -> miette::Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| miette::miette!("Failed to open {}: {}", path.display(), e))?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| miette::miette!("Failed to read CSV header: {}", e))?
        .iter()
        .map(String::from)
        .collect();
    if columns.is_empty() {
        return Err(miette::miette!("{} has no columns", path.display()));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| miette::miette!("Bad CSV record {}: {}", line + 1, e))?;
        rows.push(record.iter().map(parse_cell).collect());
    }

    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());
    Ok(Dataset::new(id, TabularData::new(columns, rows)))
}

fn parse_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Value::Int(n);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::text(cell),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cells_typed() {
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("42"), Value::Int(42));
        assert_eq!(parse_cell("-3.5"), Value::Float(-3.5));
        assert_eq!(parse_cell("east"), Value::text("east"));
        assert_eq!(parse_cell("2024-01-01"), Value::text("2024-01-01"));
        assert_eq!(parse_cell("NaN"), Value::text("NaN"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "region,sales,note").unwrap();
        writeln!(file, "east, 120,").unwrap();
        writeln!(file, "west,80.5,late").unwrap();
        writeln!(file, "north").unwrap();
        drop(file);

        let dataset = load_csv(&path).unwrap();
        assert_eq!(dataset.id, "sales");
        assert_eq!(dataset.data.columns, vec!["region", "sales", "note"]);
        assert_eq!(dataset.data.rows.len(), 3);
        assert_eq!(dataset.data.rows[0][1], Value::Int(120));
        assert_eq!(dataset.data.rows[0][2], Value::Null);
        assert_eq!(dataset.data.rows[1][1], Value::Float(80.5));
        // Short rows are padded
        assert_eq!(dataset.data.rows[2][1], Value::Null);
    }

    #[test]
    fn test_missing_file() {
        assert!(load_csv(Path::new("/nonexistent/file.csv")).is_err());
    }
}
