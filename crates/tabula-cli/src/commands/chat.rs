//! Chat command - an interactive session that keeps conversation turns.

use std::io::{self, BufRead, Write};
use std::path::Path;
use tabula_types::ConversationTurn;

use super::analyze::print_response;
use crate::loader::load_csv;

pub(crate) async fn run(file: &Path, offline: bool) -> miette::Result<()> {
    let dataset = load_csv(file)?;
    let pipeline = super::build_pipeline(offline)?;

    println!(
        "Loaded {} ({} rows, {} columns)",
        dataset.id,
        dataset.data.rows.len(),
        dataset.data.columns.len()
    );
    println!("Ask a question. Commands: /history, /reset, /quit");

    let mut history: Vec<ConversationTurn> = Vec::new();
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout()
            .flush()
            .map_err(|e| miette::miette!("Failed to write prompt: {}", e))?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| miette::miette!("Failed to read input: {}", e))?;
        if read == 0 {
            break;
        }

        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                println!("Conversation cleared.");
                continue;
            }
            "/history" => {
                if history.is_empty() {
                    println!("No turns yet.");
                }
                for turn in &history {
                    println!("[{:?}] {}", turn.role, turn.content);
                }
                continue;
            }
            _ => {}
        }

        let response = pipeline.analyze(input, &dataset, Some(history.as_slice())).await;
        println!();
        print_response(&response);
        println!();

        history.push(ConversationTurn::user(input));
        history.push(ConversationTurn::assistant(response.insights.direct_answer));
    }
    Ok(())
}
