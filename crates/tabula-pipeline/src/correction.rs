//! The self-correction loop: Generate → Validate → Execute, bounded.
//!
//! Every failure, whether a forbidden keyword, a syntax error, a dry-run
//! binder error or an execution error, is fed into the next generation as
//! explicit feedback. Each retry produces a whole new plan. Once the attempt
//! budget is spent the fixed fallback plan is returned and its preview rows
//! are attached to the result.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tabula_engine::QueryEngine;
use tabula_types::{
    check_sql_safety, validate_plan, AnalysisPlan, Dataset, ExecutionResult, QueryOutcome,
    FALLBACK_SQL,
};
use tracing::{debug, info, warn};

use crate::planner::{PlanContext, PlanGenerator};
use crate::prompt::Feedback;
use crate::stage;
use crate::stats::compute_metrics;
use crate::validator::{select_consistent, Candidate, SqlValidator, ValidationInput};

/// Temperatures used for self-consistency candidates, cycled.
const CANDIDATE_TEMPERATURES: [f32; 4] = [0.1, 0.4, 0.7, 0.9];

/// Key under which the fallback preview is reported.
pub const FALLBACK_PREVIEW: &str = "fallback_preview";

/// A plan together with what running it produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub plan: AnalysisPlan,
    pub execution: ExecutionResult,
    /// Supporting queries that failed, as human-readable notes
    pub warnings: Vec<String>,
    /// One line per attempt
    pub trace: Vec<String>,
}

pub struct CorrectionLoop {
    generator: PlanGenerator,
    validator: SqlValidator,
    engine: Arc<dyn QueryEngine>,
    engine_timeout: Duration,
    max_retries: u32,
    candidates: usize,
}

impl CorrectionLoop {
    pub fn new(
        generator: PlanGenerator,
        validator: SqlValidator,
        engine: Arc<dyn QueryEngine>,
        engine_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            generator,
            validator,
            engine,
            engine_timeout,
            max_retries: max_retries.max(1),
            candidates: 1,
        }
    }

    /// Generate this many candidates per attempt and vote on the results.
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates.max(1);
        self
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    /// Run until a plan executes or the attempt budget is spent.
    pub async fn run(&self, ctx: &PlanContext<'_>) -> LoopOutcome {
        let mut errors: Vec<String> = Vec::new();
        let mut trace = Vec::new();
        let mut feedback: Option<Feedback> = None;

        for attempt in 1..=self.max_retries {
            let result = if self.candidates > 1 {
                self.attempt_consistent(ctx, feedback.as_ref()).await
            } else {
                self.attempt(ctx, feedback.as_ref(), CANDIDATE_TEMPERATURES[0]).await
            };

            match result {
                Ok((mut plan, outcome, elapsed_ms)) => {
                    plan.validation_passed = true;
                    plan.attempts = attempt;
                    plan.validation_errors = errors;
                    info!(attempt, rows = outcome.rows.len(), "plan executed");
                    trace.push(format!("Attempt {}: executed, {} rows", attempt, outcome.rows.len()));

                    let mut execution = ExecutionResult::from_outcome(outcome, elapsed_ms);
                    let warnings = self.run_supporting(&plan, ctx.dataset, &mut execution).await;
                    execution.metrics = compute_metrics(&execution);
                    return LoopOutcome {
                        plan,
                        execution,
                        warnings,
                        trace,
                    };
                }
                Err(failure) => {
                    warn!(attempt, error = %failure.error, "attempt failed");
                    trace.push(format!("Attempt {}: {}", attempt, failure.error));
                    errors.push(format!("attempt {}: {}", attempt, failure.error));
                    feedback = Some(failure);
                }
            }
        }

        warn!(attempts = self.max_retries, "retries exhausted, using fallback plan");
        let last_error = feedback
            .map(|f| f.error)
            .unwrap_or_else(|| "plan generation failed".to_string());
        let plan = AnalysisPlan::fallback(errors, self.max_retries);
        let mut execution = ExecutionResult::failed(last_error, 0);
        let preview = stage::execute(self.engine.as_ref(), FALLBACK_SQL, ctx.dataset, self.engine_timeout).await;
        execution.intermediate_results.insert(FALLBACK_PREVIEW.to_string(), preview);
        trace.push("Fell back to a data preview".to_string());

        LoopOutcome {
            plan,
            execution,
            warnings: Vec::new(),
            trace,
        }
    }

    /// Check and run a plan that did not come out of the loop, such as a
    /// cached one. Only the deterministic stages run.
    pub async fn replay(&self, mut plan: AnalysisPlan, dataset: &Dataset) -> Option<LoopOutcome> {
        if let Err(e) = validate_plan(&plan) {
            debug!(error = %e, "cached plan no longer passes safety checks");
            return None;
        }
        if let Err(rejection) = self.validator.check(&plan.sql_query, dataset).await {
            debug!(error = %rejection, "cached plan no longer validates");
            return None;
        }
        let started = Instant::now();
        let outcome = stage::execute(self.engine.as_ref(), &plan.sql_query, dataset, self.engine_timeout).await;
        if !outcome.success {
            return None;
        }
        plan.validation_passed = true;
        let mut execution = ExecutionResult::from_outcome(outcome, started.elapsed().as_millis() as u64);
        let warnings = self.run_supporting(&plan, dataset, &mut execution).await;
        execution.metrics = compute_metrics(&execution);
        Some(LoopOutcome {
            plan,
            execution,
            warnings,
            trace: vec!["Reused a cached plan".to_string()],
        })
    }

    /// One generation, validated and executed.
    async fn attempt(
        &self,
        ctx: &PlanContext<'_>,
        feedback: Option<&Feedback>,
        temperature: f32,
    ) -> Result<(AnalysisPlan, QueryOutcome, u64), Feedback> {
        let mut plan = self.generator.generate(ctx, feedback, temperature).await;

        if let Err(e) = validate_plan(&plan) {
            return Err(Feedback {
                sql: plan.sql_query,
                error: e.to_string(),
            });
        }

        let input = ValidationInput {
            question: ctx.question,
            requirements: ctx.requirements,
            schema: ctx.schema,
            dataset: ctx.dataset,
        };
        let checked = self
            .validator
            .validate(&input, &plan.sql_query)
            .await
            .map_err(|rejection| Feedback {
                error: rejection.to_string(),
                sql: rejection.sql,
            })?;
        if checked.corrections > 0 {
            plan.steps.push(format!(
                "SQL corrected {} time(s) during validation",
                checked.corrections
            ));
        }
        plan.sql_query = checked.sql;

        let started = Instant::now();
        let outcome = stage::execute(self.engine.as_ref(), &plan.sql_query, ctx.dataset, self.engine_timeout).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !outcome.success {
            return Err(Feedback {
                sql: plan.sql_query,
                error: outcome
                    .error
                    .unwrap_or_else(|| "execution failed".to_string()),
            });
        }
        Ok((plan, outcome, elapsed_ms))
    }

    /// Several generations at different temperatures; the majority row count wins.
    async fn attempt_consistent(
        &self,
        ctx: &PlanContext<'_>,
        feedback: Option<&Feedback>,
    ) -> Result<(AnalysisPlan, QueryOutcome, u64), Feedback> {
        let mut candidates = Vec::new();
        let mut last_failure = None;

        for i in 0..self.candidates {
            let temperature = CANDIDATE_TEMPERATURES[i % CANDIDATE_TEMPERATURES.len()];
            match self.attempt(ctx, feedback, temperature).await {
                Ok((plan, outcome, elapsed)) => candidates.push(Candidate {
                    sql: plan.sql_query.clone(),
                    row_count: outcome.rows.len(),
                    value: (plan, outcome, elapsed),
                }),
                Err(failure) => last_failure = Some(failure),
            }
        }

        debug!(succeeded = candidates.len(), "self-consistency candidates executed");
        match select_consistent(candidates) {
            Some(winner) => Ok(winner.value),
            None => Err(last_failure.unwrap_or_else(|| Feedback {
                sql: String::new(),
                error: "no candidate produced a result".to_string(),
            })),
        }
    }

    /// Run supporting queries into `intermediate_results`. Failures become warnings.
    async fn run_supporting(
        &self,
        plan: &AnalysisPlan,
        dataset: &Dataset,
        execution: &mut ExecutionResult,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        for query in &plan.supporting_queries {
            if let Err(e) = check_sql_safety(&query.sql) {
                warnings.push(format!("supporting query '{}' skipped: {}", query.name, e));
                continue;
            }
            let outcome = stage::execute(self.engine.as_ref(), &query.sql, dataset, self.engine_timeout).await;
            if let Some(error) = &outcome.error {
                warnings.push(format!("supporting query '{}' failed: {}", query.name, error));
            }
            execution.intermediate_results.insert(query.name.clone(), outcome);
        }
        warnings
    }
}
