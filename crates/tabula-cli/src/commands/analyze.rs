//! Analyze command - answer one question about a CSV file.

use std::path::Path;
use tabula_types::{AnalysisResponse, ConversationTurn, Value};

use crate::loader::load_csv;

/// Rows shown in the result preview.
const PREVIEW_ROWS: usize = 10;

pub(crate) async fn run(
    file: &Path,
    question: &str,
    history_file: Option<&Path>,
    json: bool,
    offline: bool,
) -> miette::Result<()> {
    let dataset = load_csv(file)?;
    let history = match history_file {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    let pipeline = super::build_pipeline(offline)?;

    let response = pipeline.analyze(question, &dataset, Some(history.as_slice())).await;

    if json {
        let out = serde_json::to_string_pretty(&response)
            .map_err(|e| miette::miette!("Failed to serialize response: {}", e))?;
        println!("{}", out);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn load_history(path: &Path) -> miette::Result<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read history file: {}", e))?;
    serde_json::from_str(&content).map_err(|e| miette::miette!("Failed to parse history JSON: {}", e))
}

/// Human-readable report of a response.
pub(crate) fn print_response(response: &AnalysisResponse) {
    if response.resolved.is_follow_up {
        println!("Resolved question: {}", response.resolved.resolved_question);
    }
    println!(
        "Intent: {} ({:.2})",
        response.intent.category, response.intent.confidence
    );
    println!();

    println!("SQL:");
    println!("  {}", response.plan.sql_query);
    if response.plan.is_fallback {
        println!("  (fallback after {} failed attempts)", response.plan.attempts);
        for error in &response.plan.validation_errors {
            println!("  - {}", error);
        }
    }
    println!();

    if response.execution.success {
        print_table(&response.execution.columns, &response.execution.rows);
        if response.execution.row_count > PREVIEW_ROWS {
            println!("  ... {} rows in total", response.execution.row_count);
        }
    } else if let Some(error) = &response.execution.error {
        println!("Query failed: {}", error);
    }
    println!();

    let insights = &response.insights;
    println!("Answer: {}", insights.direct_answer);
    print_list("What the data shows", &insights.what_data_shows);
    print_list("Why it happened", &insights.why_it_happened);
    print_list("Implications", &insights.business_implications);
    println!(
        "Confidence: {:.2} ({})",
        insights.confidence, insights.data_sufficiency
    );
    for warning in &insights.grounding_warnings {
        println!("  ! {}", warning);
    }
    println!();

    println!("Charts:");
    for chart in &response.visualizations {
        let mut line = format!("  {} - {}", chart.chart_type, chart.title);
        if let Some(x) = &chart.x_axis {
            line.push_str(&format!(" (x: {}, y: {})", x, chart.y_axis.join(", ")));
        }
        println!("{}", line);
    }
    println!();
    println!("Finished in {} ms", response.elapsed_ms);
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}:", title);
    for item in items {
        println!("  - {}", item);
    }
}

fn print_table(columns: &[String], rows: &[Vec<Value>]) {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .filter_map(|row| row.get(i).map(|s| s.len()))
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    println!("  {}", line(columns));
    println!(
        "  {}",
        widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
    );
    for row in &cells {
        println!("  {}", line(row.as_slice()));
    }
}
