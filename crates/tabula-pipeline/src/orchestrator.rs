//! Pipeline orchestrator - the entry point for analysing a question.

use std::sync::Arc;
use std::time::Instant;
use tabula_engine::{QueryEngine, SqliteEngine};
use tabula_llm::{CompletionClient, Embedder, HashingEmbedder, OfflineClient};
use tabula_profiler::SchemaCache;
use tabula_rag::{RetrievalError, Retriever, SemanticRetriever};
use tabula_types::{
    AnalysisResponse, ConversationTurn, Dataset, Provenance, SchemaProfile, Scope,
};
use tracing::{debug, info, warn};

use crate::cache::PlanCache;
use crate::config::PipelineConfig;
use crate::context::ContextResolver;
use crate::correction::{CorrectionLoop, LoopOutcome};
use crate::insights::InsightSynthesizer;
use crate::intent::IntentClassifier;
use crate::interpreter::interpret;
use crate::planner::{PlanContext, PlanGenerator};
use crate::requirements::RequirementExtractor;
use crate::validator::SqlValidator;
use crate::visualize::VisualizationSelector;

/// The analysis pipeline.
///
/// Shared state (schema cache, retrieval indexes, plan cache, engine
/// connections) is safe to use from concurrent `analyze` calls.
pub struct Pipeline {
    config: PipelineConfig,
    engine: Arc<dyn QueryEngine>,
    retriever: Arc<dyn Retriever>,
    schemas: SchemaCache,
    plans: Option<PlanCache>,
    context: ContextResolver,
    intent: IntentClassifier,
    requirements: RequirementExtractor,
    correction: CorrectionLoop,
    insights: InsightSynthesizer,
    visualizer: VisualizationSelector,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// A pipeline with no completion backend. Every stage takes its
    /// deterministic path.
    pub fn offline() -> Self {
        Self::builder().build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer `question` about `dataset`.
    ///
    /// Always returns a response. Failures show up as
    /// `execution.success == false`, a fallback plan, or insufficient data.
    pub async fn analyze(
        &self,
        question: &str,
        dataset: &Dataset,
        history: Option<&[ConversationTurn]>,
    ) -> AnalysisResponse {
        let started = Instant::now();
        let mut steps = Vec::new();
        info!(dataset = %dataset.id, question, "analysis started");

        // 1. Resolve follow-ups against the conversation
        let resolved = self.context.resolve(question, history.unwrap_or(&[])).await;
        if resolved.is_follow_up {
            steps.push(format!("Resolved follow-up as: {}", resolved.resolved_question));
        }
        let q = resolved.resolved_question.clone();

        // 2. Classify intent
        let intent = self.intent.classify(&q, &dataset.data.columns).await;
        steps.push(format!(
            "Classified intent as {} ({:.2}, {})",
            intent.category,
            intent.confidence,
            intent.classified_by.as_str()
        ));

        // 3. Profile the schema (cached)
        let schema = self.profile(dataset).await;
        steps.push(format!(
            "Profiled {} columns over {} rows",
            schema.columns.len(),
            schema.row_count
        ));

        // 4. Retrieve grounding context
        let scope = Scope::dataset(&dataset.id).with_user(dataset.owner.clone());
        if let Err(e) = self.retriever.index_schema(dataset, &schema).await {
            warn!(error = %e, "schema indexing failed");
        }
        let retrieved = self.retriever.retrieve(&q, &scope, &schema).await;
        steps.push(format!(
            "Retrieved {} schema fragments, {} similar queries, {} business terms",
            retrieved.schema_fragments.len(),
            retrieved.similar_queries.len(),
            retrieved.business_terms.len()
        ));

        // 5. Extract grounded requirements
        let requirements = self.requirements.extract(&q, &intent, &schema, &retrieved).await;
        steps.push(format!(
            "Extracted requirements: {} columns, {} aggregations, {} groupings",
            requirements.required_columns.len(),
            requirements.aggregations.len(),
            requirements.group_by_columns.len()
        ));
        for error in &requirements.validation_errors {
            steps.push(format!("Dropped from requirements: {}", error));
        }

        // 6. Plan, validate and execute, reusing a cached plan when it still runs
        let ctx = PlanContext {
            question: &q,
            intent: &intent,
            schema: &schema,
            requirements: &requirements,
            retrieved: &retrieved,
            dataset,
        };
        let cache_key = PlanCache::cache_key(&dataset.fingerprint, &q);
        let outcome = match self.cached(&cache_key, dataset).await {
            Some(outcome) => outcome,
            None => {
                let outcome = self.correction.run(&ctx).await;
                if outcome.execution.success && !outcome.plan.is_fallback {
                    if let Some(plans) = &self.plans {
                        if let Err(e) = plans.set(&cache_key, &outcome.plan) {
                            warn!(error = %e, "failed to cache plan");
                        }
                    }
                }
                outcome
            }
        };
        let LoopOutcome {
            plan,
            execution,
            warnings,
            trace,
        } = outcome;
        steps.extend(trace);

        // 7. Interpret
        let mut interpretation = interpret(&execution, &intent);
        interpretation.warnings.extend(warnings);
        steps.push(format!("Interpretation: {}", interpretation.main_finding));

        // 8. Synthesize grounded insights
        let insights = self
            .insights
            .synthesize(&q, &intent, &execution, &interpretation)
            .await;
        steps.push(format!(
            "Synthesized insights ({}, confidence {:.2})",
            insights.data_sufficiency, insights.confidence
        ));
        if !insights.grounding_warnings.is_empty() {
            steps.push(format!(
                "{} number(s) in the narrative could not be traced to the result",
                insights.grounding_warnings.len()
            ));
        }

        // 9. Choose charts
        let visualizations = self.visualizer.select(&q, &intent, &execution).await;
        steps.push(format!(
            "Recommended {}",
            visualizations
                .iter()
                .map(|v| v.chart_type.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));

        // 10. Learn from queries that worked
        if execution.success && !plan.is_fallback {
            if let Err(e) = self.retriever.record_query(&q, &plan.sql_query, &scope).await {
                debug!(error = %e, "failed to record query");
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            dataset = %dataset.id,
            success = execution.success,
            rows = execution.row_count,
            attempts = plan.attempts,
            fallback = plan.is_fallback,
            elapsed_ms,
            "analysis finished"
        );

        AnalysisResponse {
            question: question.to_string(),
            resolved,
            intent,
            schema,
            retrieved,
            requirements,
            plan,
            execution,
            interpretation,
            visualizations,
            insights,
            reasoning_steps: steps,
            elapsed_ms,
        }
    }

    /// Schema profile of a dataset, from the cache when possible.
    pub async fn profile(&self, dataset: &Dataset) -> Arc<SchemaProfile> {
        match self.schemas.get_or_profile(dataset).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(error = %e, "schema cache failed, profiling directly");
                Arc::new(tabula_profiler::profile(&dataset.data))
            }
        }
    }

    /// Forget everything derived from a dataset.
    pub fn invalidate_dataset(&self, dataset: &Dataset) {
        self.schemas.invalidate(&dataset.id);
        self.retriever.forget_dataset(&dataset.id);
        self.engine.evict(&dataset.fingerprint);
        info!(dataset = %dataset.id, "dataset invalidated");
    }

    /// Teach the retriever a business term.
    pub async fn add_business_term(
        &self,
        scope: &Scope,
        term: &str,
        definition: &str,
    ) -> Result<(), RetrievalError> {
        self.retriever.add_term(term, definition, scope).await
    }

    async fn cached(&self, key: &str, dataset: &Dataset) -> Option<LoopOutcome> {
        let plans = self.plans.as_ref()?;
        let plan = plans.get(key)?;
        match self.correction.replay(plan, dataset).await {
            Some(mut outcome) => {
                info!("plan cache hit");
                outcome.plan.origin = Provenance::Cache;
                Some(outcome)
            }
            None => {
                warn!("cached plan failed, evicting");
                if let Err(e) = plans.evict(key) {
                    debug!(error = %e, "failed to evict cached plan");
                }
                None
            }
        }
    }
}

/// Builder for [`Pipeline`]. Unset collaborators get offline defaults.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    client: Option<Arc<dyn CompletionClient>>,
    engine: Option<Arc<dyn QueryEngine>>,
    retriever: Option<Arc<dyn Retriever>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Embedder for the default retriever. Ignored when a retriever is set.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn build(self) -> Pipeline {
        let config = self.config.unwrap_or_default();
        let client = self.client.unwrap_or_else(|| Arc::new(OfflineClient));
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(SqliteEngine::new().with_timeout(config.engine_timeout)));
        let retriever = self.retriever.unwrap_or_else(|| {
            let embedder = self
                .embedder
                .unwrap_or_else(|| Arc::new(HashingEmbedder::default()));
            Arc::new(
                SemanticRetriever::new(embedder)
                    .with_top_k(config.top_k)
                    .with_timeout(config.llm_timeout),
            )
        });
        let plans = config.plan_cache.then(|| match &config.cache_dir {
            Some(dir) => PlanCache::persistent(dir.clone()),
            None => PlanCache::in_memory(),
        });

        let timeout = config.llm_timeout;
        let validator = SqlValidator::new(client.clone(), engine.clone())
            .with_timeouts(timeout, config.engine_timeout)
            .with_max_corrections(config.max_corrections)
            .with_semantic_check(config.semantic_check);
        let mut correction = CorrectionLoop::new(
            PlanGenerator::new(client.clone(), timeout, config.sample_rows),
            validator,
            engine.clone(),
            config.engine_timeout,
            config.max_retries,
        );
        if config.self_consistency() {
            correction = correction.with_candidates(config.self_consistency_candidates as usize);
        }

        info!(
            backend = client.name(),
            max_retries = config.max_retries,
            plan_cache = config.plan_cache,
            "pipeline ready"
        );

        Pipeline {
            context: ContextResolver::new(client.clone(), timeout, config.history_turns),
            intent: IntentClassifier::new(client.clone(), timeout),
            requirements: RequirementExtractor::new(client.clone(), timeout),
            insights: InsightSynthesizer::new(client.clone(), timeout),
            visualizer: VisualizationSelector::new(client, timeout),
            correction,
            engine,
            retriever,
            schemas: SchemaCache::new(),
            plans,
            config,
        }
    }
}
