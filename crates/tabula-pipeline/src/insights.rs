//! Insight synthesis with a grounding guard.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tabula_llm::{parse_json, CompletionClient, CompletionRequest};
use tabula_types::{
    DataSufficiency, ExecutionResult, Insights, IntentResult, InterpretationResult, Provenance, Value,
};
use tracing::{info, warn};

use crate::grounding::{self, Reference};
use crate::prompt::{self, format_number, INSIGHT_SYSTEM};
use crate::stage::{complete, StageError};

const DEFAULT_CONFIDENCE: f64 = 0.7;
const FALLBACK_CONFIDENCE: f64 = 0.4;
const MAX_ITEMS: usize = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInsights {
    #[serde(alias = "directAnswer")]
    direct_answer: String,
    #[serde(alias = "whatDataShows")]
    what_data_shows: Vec<String>,
    #[serde(alias = "whyItHappened")]
    why_it_happened: Vec<String>,
    #[serde(alias = "businessImplications")]
    business_implications: Vec<String>,
    confidence: Option<f64>,
    #[serde(alias = "dataSufficiency")]
    data_sufficiency: Option<String>,
}

pub struct InsightSynthesizer {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl InsightSynthesizer {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Explain the result. Numbers the narrative cannot trace back to the
    /// result are reported in `grounding_warnings`.
    pub async fn synthesize(
        &self,
        question: &str,
        intent: &IntentResult,
        execution: &ExecutionResult,
        interpretation: &InterpretationResult,
    ) -> Insights {
        if !execution.success || execution.row_count == 0 {
            let mut insights = fallback(execution, interpretation);
            insights.data_sufficiency = DataSufficiency::Insufficient;
            return insights;
        }

        let insights = match self.try_synthesize(question, intent, execution, interpretation).await {
            Ok(mut insights) => {
                let reference = Reference::build(execution, interpretation);
                grounding::apply(&mut insights, &reference);
                insights
            }
            Err(e) => {
                warn!(error = %e, "insight synthesis fell back to a summary");
                fallback(execution, interpretation)
            }
        };
        info!(
            sufficiency = %insights.data_sufficiency,
            confidence = insights.confidence,
            ungrounded = insights.grounding_warnings.len(),
            "insights synthesized"
        );
        insights
    }

    async fn try_synthesize(
        &self,
        question: &str,
        intent: &IntentResult,
        execution: &ExecutionResult,
        interpretation: &InterpretationResult,
    ) -> Result<Insights, StageError> {
        let request = CompletionRequest::new(prompt::build_insight_prompt(
            question,
            intent,
            execution,
            interpretation,
        ))
        .system(INSIGHT_SYSTEM)
        .json();
        let text = complete(self.client.as_ref(), request, self.timeout, "insights").await?;
        let raw: RawInsights = parse_json(&text)?;

        let direct_answer = raw.direct_answer.trim().to_string();
        if direct_answer.is_empty() {
            return Err(StageError::Unusable("empty direct answer".to_string()));
        }

        Ok(Insights {
            direct_answer,
            what_data_shows: trimmed(raw.what_data_shows),
            why_it_happened: trimmed(raw.why_it_happened),
            business_implications: trimmed(raw.business_implications),
            confidence: raw.confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0),
            data_sufficiency: raw
                .data_sufficiency
                .as_deref()
                .and_then(DataSufficiency::parse)
                .unwrap_or(DataSufficiency::Partial),
            grounding_warnings: Vec::new(),
            generated_by: Provenance::Model,
        })
    }
}

fn trimmed(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_ITEMS)
        .collect()
}

/// A summary built only from counts and the first number in the result.
pub fn fallback(execution: &ExecutionResult, interpretation: &InterpretationResult) -> Insights {
    let direct_answer = if execution.success {
        let mut answer = format!(
            "The query returned {} rows across {} columns.",
            execution.row_count,
            execution.columns.len()
        );
        if let Some((column, value)) = first_number(execution) {
            answer.push_str(&format!(" The first {} value is {}.", column, format_number(value)));
        }
        answer
    } else {
        "The question could not be answered from this dataset.".to_string()
    };

    let what_data_shows = if interpretation.main_finding.is_empty() {
        Vec::new()
    } else {
        vec![interpretation.main_finding.clone()]
    };

    Insights {
        direct_answer,
        what_data_shows,
        why_it_happened: Vec::new(),
        business_implications: Vec::new(),
        confidence: FALLBACK_CONFIDENCE,
        data_sufficiency: DataSufficiency::Partial,
        grounding_warnings: Vec::new(),
        generated_by: Provenance::Rules,
    }
}

fn first_number(execution: &ExecutionResult) -> Option<(&str, f64)> {
    execution.rows.iter().find_map(|row| {
        row.iter().enumerate().find_map(|(i, v)| match v {
            Value::Int(_) | Value::Float(_) => Some((execution.columns.get(i)?.as_str(), v.as_f64()?)),
            _ => None,
        })
    })
}
