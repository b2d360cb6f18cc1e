//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Knobs for the analysis pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Plan generations before the fallback plan is used
    pub max_retries: u32,
    /// Targeted repair calls per SQL validation
    pub max_corrections: u32,
    /// Candidates per generation for self-consistency; below 2 it is off
    pub self_consistency_candidates: u32,
    /// Run the semantic self-critique stage
    pub semantic_check: bool,
    /// Conversation turns the context resolver reads
    pub history_turns: usize,
    /// Entries returned per retrieval index
    pub top_k: usize,
    /// Sample rows shown to the plan generator
    pub sample_rows: usize,
    /// Timeout for each completion and retrieval call
    pub llm_timeout: Duration,
    /// Timeout for each query
    pub engine_timeout: Duration,
    /// Reuse accepted plans for repeated questions
    pub plan_cache: bool,
    /// Persist cached plans here; memory only when unset
    pub cache_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_corrections: 2,
            self_consistency_candidates: 0,
            semantic_check: true,
            history_turns: 5,
            top_k: 5,
            sample_rows: 5,
            llm_timeout: Duration::from_secs(120),
            engine_timeout: Duration::from_secs(30),
            plan_cache: true,
            cache_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = std::env::var("TABULA_CACHE_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let plan_cache = std::env::var("TABULA_PLAN_CACHE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.plan_cache);

        Self {
            max_retries: env_parse("TABULA_MAX_RETRIES").unwrap_or(defaults.max_retries),
            max_corrections: env_parse("TABULA_MAX_CORRECTIONS").unwrap_or(defaults.max_corrections),
            self_consistency_candidates: env_parse("TABULA_SELF_CONSISTENCY")
                .unwrap_or(defaults.self_consistency_candidates),
            semantic_check: defaults.semantic_check,
            history_turns: env_parse("TABULA_HISTORY_TURNS").unwrap_or(defaults.history_turns),
            top_k: env_parse("TABULA_TOP_K").unwrap_or(defaults.top_k),
            sample_rows: defaults.sample_rows,
            llm_timeout: env_parse("TABULA_LLM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            engine_timeout: env_parse("TABULA_ENGINE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.engine_timeout),
            plan_cache,
            cache_dir,
        }
    }

    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Whether self-consistency voting is on.
    pub fn self_consistency(&self) -> bool {
        self.self_consistency_candidates >= 2
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Builder for pipeline configuration.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries.max(1);
        self
    }

    pub fn max_corrections(mut self, corrections: u32) -> Self {
        self.config.max_corrections = corrections;
        self
    }

    pub fn self_consistency_candidates(mut self, candidates: u32) -> Self {
        self.config.self_consistency_candidates = candidates;
        self
    }

    pub fn semantic_check(mut self, enabled: bool) -> Self {
        self.config.semantic_check = enabled;
        self
    }

    pub fn history_turns(mut self, turns: usize) -> Self {
        self.config.history_turns = turns;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k.max(1);
        self
    }

    pub fn sample_rows(mut self, rows: usize) -> Self {
        self.config.sample_rows = rows;
        self
    }

    pub fn llm_timeout(mut self, timeout: Duration) -> Self {
        self.config.llm_timeout = timeout;
        self
    }

    pub fn engine_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine_timeout = timeout;
        self
    }

    pub fn plan_cache(mut self, enabled: bool) -> Self {
        self.config.plan_cache = enabled;
        self
    }

    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(path.into());
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
