//! Profile command - show the inferred schema of a CSV file.

use std::path::Path;

use crate::loader::load_csv;

pub(crate) async fn run(file: &Path, json: bool) -> miette::Result<()> {
    let dataset = load_csv(file)?;
    let pipeline = super::build_pipeline(true)?;
    let schema = pipeline.profile(&dataset).await;

    if json {
        let out = serde_json::to_string_pretty(schema.as_ref())
            .map_err(|e| miette::miette!("Failed to serialize profile: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!("Dataset: {} ({} rows)", dataset.id, schema.row_count);
    println!("Fingerprint: {}", dataset.fingerprint);
    println!("Quality score: {:.2}", schema.quality_score);
    println!();

    println!("Columns:");
    for column in schema.columns.values() {
        println!("  {}", column.describe());
    }

    if !schema.derived_relationships.is_empty() {
        println!();
        println!("Relationships:");
        for rel in &schema.derived_relationships {
            println!("  {} -> {} ({})", rel.from_column, rel.to_column, rel.kind);
        }
    }
    Ok(())
}
