//! Multi-stage SQL validation.
//!
//! ```text
//!   sql ──▶ syntax ──▶ dry run ──▶ semantic review ──▶ accepted
//!             │           │              │
//!             └───────────┴── error ─────┴── corrected sql
//!                         │                       │
//!                   targeted repair ──────────────┘
//!                         │
//!                 back to syntax (bounded)
//! ```
//!
//! Each stage only runs when the previous one passed. A failing stage gets
//! one repair call scoped to its error; the total number of corrections per
//! validation is bounded.

use serde::Deserialize;
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tabula_engine::QueryEngine;
use tabula_llm::{parse_json, CompletionClient, CompletionRequest};
use tabula_types::{check_sql_safety, Dataset, QueryRequirements, SchemaProfile};
use tracing::{debug, info, warn};

use crate::prompt::{self, REPAIR_SYSTEM, REVIEW_SYSTEM};
use crate::stage::{self, complete, StageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStage {
    Syntax,
    DryRun,
    Semantic,
}

impl SqlStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlStage::Syntax => "syntax",
            SqlStage::DryRun => "dry run",
            SqlStage::Semantic => "semantic",
        }
    }
}

impl fmt::Display for SqlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL that passed every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedSql {
    pub sql: String,
    pub corrections: u32,
    /// What the review stages said along the way
    pub notes: Vec<String>,
}

/// SQL that could not be brought through the stages.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRejection {
    pub stage: SqlStage,
    pub error: String,
    /// The last SQL that was tried
    pub sql: String,
}

impl fmt::Display for SqlRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} check failed: {}", self.stage, self.error)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReview {
    #[serde(alias = "answersQuestion")]
    answers_question: Option<bool>,
    issues: Vec<String>,
    #[serde(alias = "correctedSql")]
    corrected_sql: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepair {
    #[serde(alias = "sql_query", alias = "sqlQuery")]
    sql: String,
}

/// What the review stage concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum Review {
    Accepted,
    Corrected { sql: String, issues: Vec<String> },
}

/// Inputs shared by every stage.
pub struct ValidationInput<'a> {
    pub question: &'a str,
    pub requirements: &'a QueryRequirements,
    pub schema: &'a SchemaProfile,
    pub dataset: &'a Dataset,
}

pub struct SqlValidator {
    client: Arc<dyn CompletionClient>,
    engine: Arc<dyn QueryEngine>,
    llm_timeout: Duration,
    engine_timeout: Duration,
    max_corrections: u32,
    semantic_check: bool,
}

impl SqlValidator {
    pub fn new(client: Arc<dyn CompletionClient>, engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            client,
            engine,
            llm_timeout: Duration::from_secs(120),
            engine_timeout: Duration::from_secs(30),
            max_corrections: 2,
            semantic_check: true,
        }
    }

    pub fn with_timeouts(mut self, llm: Duration, engine: Duration) -> Self {
        self.llm_timeout = llm;
        self.engine_timeout = engine;
        self
    }

    pub fn with_max_corrections(mut self, max: u32) -> Self {
        self.max_corrections = max;
        self
    }

    pub fn with_semantic_check(mut self, enabled: bool) -> Self {
        self.semantic_check = enabled;
        self
    }

    /// Run every stage, repairing failures up to the correction bound.
    pub async fn validate(&self, input: &ValidationInput<'_>, sql: &str) -> Result<CheckedSql, SqlRejection> {
        let mut sql = normalize(sql);
        let mut corrections = 0;
        let mut notes = Vec::new();

        loop {
            let failure = match self.check(&sql, input.dataset).await {
                Err(failure) => failure,
                Ok(()) => match self.review(input, &sql).await {
                    Review::Accepted => {
                        return Ok(CheckedSql {
                            sql,
                            corrections,
                            notes,
                        })
                    }
                    Review::Corrected { sql: corrected, issues } => {
                        if corrections >= self.max_corrections {
                            // Out of budget; the current query already runs.
                            notes.push("review correction skipped: correction budget spent".into());
                            return Ok(CheckedSql {
                                sql,
                                corrections,
                                notes,
                            });
                        }
                        match check_sql_safety(&corrected) {
                            Ok(()) => {
                                corrections += 1;
                                info!(attempt = corrections, "semantic review corrected the query");
                                notes.extend(issues);
                                sql = normalize(&corrected);
                                continue;
                            }
                            Err(e) => {
                                notes.push(format!("review correction rejected: {}", e));
                                return Ok(CheckedSql {
                                    sql,
                                    corrections,
                                    notes,
                                });
                            }
                        }
                    }
                },
            };

            if corrections >= self.max_corrections {
                return Err(failure);
            }
            corrections += 1;
            debug!(stage = %failure.stage, error = %failure.error, "attempting targeted repair");

            match self.repair(input, &failure).await {
                Ok(repaired) => match check_sql_safety(&repaired) {
                    Ok(()) => sql = normalize(&repaired),
                    Err(e) => {
                        warn!(error = %e, "repair produced unsafe SQL");
                        return Err(SqlRejection {
                            stage: failure.stage,
                            error: format!("{}; repair rejected: {}", failure.error, e),
                            sql,
                        });
                    }
                },
                Err(e) => {
                    debug!(error = %e, "repair call failed");
                    return Err(failure);
                }
            }
        }
    }

    /// Syntax and dry run only. No completion calls.
    pub async fn check(&self, sql: &str, dataset: &Dataset) -> Result<(), SqlRejection> {
        let sql = normalize(sql);
        check_syntax(&sql).map_err(|error| SqlRejection {
            stage: SqlStage::Syntax,
            error,
            sql: sql.clone(),
        })?;
        self.dry_run(&sql, dataset).await.map_err(|error| SqlRejection {
            stage: SqlStage::DryRun,
            error,
            sql: sql.clone(),
        })
    }

    /// Run the query wrapped in `LIMIT 1` to surface binder and type errors.
    ///
    /// The query sits on its own lines so a trailing `--` comment cannot
    /// swallow the wrapper.
    pub async fn dry_run(&self, sql: &str, dataset: &Dataset) -> Result<(), String> {
        let wrapped = format!("SELECT * FROM (\n{}\n) LIMIT 1", sql);
        let outcome = stage::execute(self.engine.as_ref(), &wrapped, dataset, self.engine_timeout).await;
        if outcome.success {
            Ok(())
        } else {
            Err(outcome
                .error
                .unwrap_or_else(|| "dry run failed".to_string()))
        }
    }

    /// Ask whether the SQL answers the question. A failed call accepts the query.
    pub async fn review(&self, input: &ValidationInput<'_>, sql: &str) -> Review {
        if !self.semantic_check {
            return Review::Accepted;
        }
        match self.try_review(input, sql).await {
            Ok(review) => review,
            Err(e) => {
                debug!(error = %e, "semantic review unavailable, accepting query");
                Review::Accepted
            }
        }
    }

    async fn try_review(&self, input: &ValidationInput<'_>, sql: &str) -> Result<Review, StageError> {
        let request = CompletionRequest::new(prompt::build_review_prompt(
            input.question,
            input.requirements,
            sql,
        ))
        .system(REVIEW_SYSTEM)
        .json();
        let text = complete(self.client.as_ref(), request, self.llm_timeout, "review").await?;
        let raw: RawReview = parse_json(&text)?;

        if raw.answers_question.unwrap_or(true) {
            return Ok(Review::Accepted);
        }
        match raw.corrected_sql.map(|s| normalize(&s)) {
            Some(corrected) if !corrected.is_empty() && corrected != normalize(sql) => {
                Ok(Review::Corrected {
                    sql: corrected,
                    issues: raw.issues,
                })
            }
            // Criticism without a replacement query is not actionable.
            _ => Ok(Review::Accepted),
        }
    }

    async fn repair(&self, input: &ValidationInput<'_>, failure: &SqlRejection) -> Result<String, StageError> {
        let request = CompletionRequest::new(prompt::build_repair_prompt(
            input.question,
            input.schema,
            &failure.sql,
            failure.stage.as_str(),
            &failure.error,
        ))
        .system(REPAIR_SYSTEM)
        .json();
        let text = complete(self.client.as_ref(), request, self.llm_timeout, "repair").await?;
        let raw: RawRepair = parse_json(&text)?;
        let sql = normalize(&raw.sql);
        if sql.is_empty() {
            return Err(StageError::Unusable("repair returned empty SQL".to_string()));
        }
        Ok(sql)
    }
}

/// Parse against the SQLite dialect. Exactly one read-only query is allowed.
pub fn check_syntax(sql: &str) -> Result<(), String> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql).map_err(|e| e.to_string())?;
    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err("no statement found".to_string()),
        [_] => Err("only SELECT queries are allowed".to_string()),
        _ => Err(format!("expected one statement, found {}", statements.len())),
    }
}

fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_string()
}

/// One executed candidate for self-consistency voting.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub sql: String,
    pub row_count: usize,
    pub value: T,
}

/// Pick the candidate whose row count most candidates agree on.
///
/// Ties between row counts, and between candidates inside the winning
/// group, go to the shorter SQL.
pub fn select_consistent<T>(candidates: Vec<Candidate<T>>) -> Option<Candidate<T>> {
    let mut votes: Vec<(usize, usize)> = Vec::new();
    for c in &candidates {
        match votes.iter_mut().find(|(rows, _)| *rows == c.row_count) {
            Some((_, n)) => *n += 1,
            None => votes.push((c.row_count, 1)),
        }
    }
    let best_votes = votes.iter().map(|(_, n)| *n).max()?;
    let winners: Vec<usize> = votes
        .iter()
        .filter(|(_, n)| *n == best_votes)
        .map(|(rows, _)| *rows)
        .collect();

    candidates
        .into_iter()
        .filter(|c| winners.contains(&c.row_count))
        .min_by_key(|c| c.sql.len())
}
