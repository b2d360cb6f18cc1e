//! The bundled pipeline response.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    AnalysisPlan, ExecutionResult, Insights, IntentResult, InterpretationResult,
    QueryRequirements, ResolvedQuestion, RetrievedContext, SchemaProfile, VisualizationConfig,
};

/// Everything the pipeline produced for one question.
///
/// Failures are reported through `execution.success`,
/// `plan.validation_passed` and `insights.data_sufficiency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub question: String,
    pub resolved: ResolvedQuestion,
    pub intent: IntentResult,
    pub schema: Arc<SchemaProfile>,
    pub retrieved: RetrievedContext,
    pub requirements: QueryRequirements,
    pub plan: AnalysisPlan,
    pub execution: ExecutionResult,
    pub interpretation: InterpretationResult,
    pub visualizations: Vec<VisualizationConfig>,
    pub insights: Insights,
    /// Human-readable trace of what each stage did, in order
    pub reasoning_steps: Vec<String>,
    pub elapsed_ms: u64,
}
