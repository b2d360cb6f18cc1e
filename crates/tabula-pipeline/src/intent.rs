//! Intent classification.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tabula_llm::{parse_json, CompletionClient, CompletionRequest};
use tabula_types::{IntentCategory, IntentResult, Provenance};
use tracing::{info, warn};

use crate::prompt::{self, INTENT_SYSTEM};
use crate::rules;
use crate::stage::{complete, StageError};

/// Confidence assigned when the model's category is outside the closed set.
const COERCED_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIntent {
    category: Option<String>,
    confidence: Option<f64>,
    #[serde(alias = "requiredOperations")]
    required_operations: Vec<String>,
    #[serde(alias = "needsTimeDimension")]
    needs_time_dimension: Option<bool>,
    #[serde(alias = "needsComparison")]
    needs_comparison: Option<bool>,
}

pub struct IntentClassifier {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Classify a question. Always returns a value.
    pub async fn classify(&self, question: &str, columns: &[String]) -> IntentResult {
        let intent = self
            .try_classify(question, columns)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "intent classification fell back to keyword rules");
                rules::classify_intent(question)
            });
        info!(
            category = %intent.category,
            confidence = intent.confidence,
            by = intent.classified_by.as_str(),
            "intent classified"
        );
        intent
    }

    async fn try_classify(&self, question: &str, columns: &[String]) -> Result<IntentResult, StageError> {
        let request = CompletionRequest::new(prompt::build_intent_prompt(question, columns))
            .system(INTENT_SYSTEM)
            .json();
        let text = complete(self.client.as_ref(), request, self.timeout, "intent").await?;
        let raw: RawIntent = parse_json(&text)?;
        Ok(coerce(raw))
    }
}

/// Validate the model's answer against the closed category set.
fn coerce(raw: RawIntent) -> IntentResult {
    let parsed = raw.category.as_deref().and_then(IntentCategory::parse);
    let mut intent = match parsed {
        Some(category) => IntentResult::new(category, raw.confidence.unwrap_or(0.8)),
        None => {
            warn!(category = ?raw.category, "unknown intent category, using Descriptive");
            IntentResult::new(IntentCategory::Descriptive, COERCED_CONFIDENCE)
        }
    };
    intent.required_operations = raw.required_operations;
    if let Some(flag) = raw.needs_time_dimension {
        intent.needs_time_dimension = flag || intent.category == IntentCategory::Trend;
    }
    if let Some(flag) = raw.needs_comparison {
        intent.needs_comparison = flag || intent.category == IntentCategory::Comparative;
    }
    intent.classified_by = Provenance::Model;
    intent
}
