//! The semantic retriever.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tabula_llm::{Embedder, LlmError};
use tabula_types::{
    BusinessTerm, Dataset, PastQuery, RetrievedContext, SchemaProfile, Scope,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::VectorIndex;

/// Entries returned per index.
pub const DEFAULT_TOP_K: usize = 5;

/// Past queries and terms below this similarity are noise.
const DEFAULT_MIN_SCORE: f32 = 0.2;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),

    #[error("embedding timed out after {0}ms")]
    Timeout(u64),
}

/// Supplies grounding context to the generation stages.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Index one fragment per column of the dataset.
    async fn index_schema(&self, dataset: &Dataset, schema: &SchemaProfile) -> Result<(), RetrievalError>;

    /// Retrieve context for a question. Never fails; degrades to the full schema.
    async fn retrieve(&self, question: &str, scope: &Scope, schema: &SchemaProfile) -> RetrievedContext;

    /// Remember a question whose SQL executed successfully.
    async fn record_query(&self, question: &str, sql: &str, scope: &Scope) -> Result<(), RetrievalError>;

    /// Add or replace a business-term definition.
    async fn add_term(&self, term: &str, definition: &str, scope: &Scope) -> Result<(), RetrievalError>;

    /// Drop schema fragments and past queries recorded for a dataset.
    fn forget_dataset(&self, dataset_id: &str);
}

/// Retriever over three in-memory indexes.
pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    schema: RwLock<VectorIndex<String>>,
    queries: RwLock<VectorIndex<(String, String)>>,
    terms: RwLock<VectorIndex<(String, String)>>,
    /// Dataset id to the fingerprint its fragments were built from
    indexed: RwLock<HashMap<String, String>>,
    top_k: usize,
    min_score: f32,
    timeout: Duration,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            schema: RwLock::default(),
            queries: RwLock::default(),
            terms: RwLock::default(),
            indexed: RwLock::default(),
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Entry counts of the schema, query and term indexes.
    pub fn sizes(&self) -> (usize, usize, usize) {
        (read(&self.schema).len(), read(&self.queries).len(), read(&self.terms).len())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        match tokio::time::timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RetrievalError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    fn full_schema(schema: &SchemaProfile) -> Vec<String> {
        schema.columns.values().map(|c| c.describe()).collect()
    }
}

#[async_trait]
impl Retriever for SemanticRetriever {
    async fn index_schema(&self, dataset: &Dataset, schema: &SchemaProfile) -> Result<(), RetrievalError> {
        if read(&self.indexed).get(&dataset.id) == Some(&dataset.fingerprint) {
            return Ok(());
        }

        // Embed outside the lock, then swap fragments in at once.
        let mut fragments = Vec::with_capacity(schema.columns.len());
        for column in schema.columns.values() {
            let text = column.describe();
            let embedding = self.embed(&text).await?;
            fragments.push((column.name.clone(), text, embedding));
        }

        let scope = Scope::dataset(&dataset.id);
        {
            let mut index = write(&self.schema);
            index.remove_where(|s| s == &scope);
            for (name, text, embedding) in fragments {
                index.upsert(name, scope.clone(), embedding, text);
            }
        }
        write(&self.indexed).insert(dataset.id.clone(), dataset.fingerprint.clone());
        debug!(dataset = %dataset.id, columns = schema.columns.len(), "schema indexed");
        Ok(())
    }

    async fn retrieve(&self, question: &str, scope: &Scope, schema: &SchemaProfile) -> RetrievedContext {
        let embedding = match self.embed(question).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "retrieval degraded to full schema");
                return RetrievedContext {
                    schema_fragments: Self::full_schema(schema),
                    degraded: true,
                    ..Default::default()
                };
            }
        };

        let schema_scope = Scope {
            dataset_id: scope.dataset_id.clone(),
            user_id: None,
        };
        let schema_fragments: Vec<String> = read(&self.schema)
            .search(&embedding, &schema_scope, self.top_k, f32::MIN)
            .into_iter()
            .map(|hit| hit.payload.clone())
            .collect();

        let similar_queries = read(&self.queries)
            .search(&embedding, scope, self.top_k, self.min_score)
            .into_iter()
            .map(|hit| PastQuery {
                question: hit.payload.0.clone(),
                sql: hit.payload.1.clone(),
                score: hit.score,
            })
            .collect();

        let business_terms = read(&self.terms)
            .search(&embedding, scope, self.top_k, self.min_score)
            .into_iter()
            .map(|hit| BusinessTerm {
                term: hit.payload.0.clone(),
                definition: hit.payload.1.clone(),
                score: hit.score,
            })
            .collect();

        // Nothing indexed for this dataset yet
        if schema_fragments.is_empty() {
            return RetrievedContext {
                schema_fragments: Self::full_schema(schema),
                similar_queries,
                business_terms,
                degraded: true,
            };
        }

        RetrievedContext {
            schema_fragments,
            similar_queries,
            business_terms,
            degraded: false,
        }
    }

    async fn record_query(&self, question: &str, sql: &str, scope: &Scope) -> Result<(), RetrievalError> {
        let embedding = self.embed(question).await?;
        let key = question.trim().to_lowercase();
        write(&self.queries).upsert(
            key,
            scope.clone(),
            embedding,
            (question.to_string(), sql.to_string()),
        );
        Ok(())
    }

    async fn add_term(&self, term: &str, definition: &str, scope: &Scope) -> Result<(), RetrievalError> {
        let embedding = self.embed(&format!("{}: {}", term, definition)).await?;
        write(&self.terms).upsert(
            term.trim().to_lowercase(),
            scope.clone(),
            embedding,
            (term.to_string(), definition.to_string()),
        );
        Ok(())
    }

    fn forget_dataset(&self, dataset_id: &str) {
        write(&self.schema).remove_where(|s| s.dataset_id.as_deref() == Some(dataset_id));
        write(&self.queries).remove_where(|s| s.dataset_id.as_deref() == Some(dataset_id));
        write(&self.indexed).remove(dataset_id);
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use tabula_llm::HashingEmbedder;
    use tabula_types::{ColumnProfile, SemanticType, TabularData};

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Err(LlmError::ServerNotRunning("http://localhost:11434".into()))
        }
    }

    fn column(name: &str, ty: SemanticType) -> ColumnProfile {
        ColumnProfile {
            name: name.to_string(),
            semantic_type: ty,
            declared_type: None,
            missing_pct: 0.0,
            unique_count: 4,
            sample_values: vec![],
            min: None,
            max: None,
            avg: None,
            stddev: None,
            earliest: None,
            latest: None,
        }
    }

    fn schema() -> SchemaProfile {
        let mut columns = IndexMap::new();
        for (name, ty) in [
            ("order_date", SemanticType::Datetime),
            ("region", SemanticType::Categorical),
            ("sales", SemanticType::Numeric),
            ("customer_email", SemanticType::Text),
        ] {
            columns.insert(name.to_string(), column(name, ty));
        }
        SchemaProfile {
            columns,
            row_count: 10,
            derived_relationships: vec![],
            quality_score: 1.0,
        }
    }

    fn dataset(id: &str) -> Dataset {
        Dataset::new(id, TabularData::new(vec!["x".into()], vec![]))
    }

    #[tokio::test]
    async fn test_schema_fragments_ranked() {
        let retriever = SemanticRetriever::new(Arc::new(HashingEmbedder::default())).with_top_k(2);
        retriever.index_schema(&dataset("orders"), &schema()).await.unwrap();

        let ctx = retriever
            .retrieve("total sales by region", &Scope::dataset("orders"), &schema())
            .await;
        assert!(!ctx.degraded);
        assert_eq!(ctx.schema_fragments.len(), 2);
        assert!(ctx.schema_fragments.iter().any(|f| f.starts_with("sales")));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades() {
        let retriever = SemanticRetriever::new(Arc::new(BrokenEmbedder));
        assert!(retriever.index_schema(&dataset("orders"), &schema()).await.is_err());

        let ctx = retriever
            .retrieve("total sales", &Scope::dataset("orders"), &schema())
            .await;
        assert!(ctx.degraded);
        assert_eq!(ctx.schema_fragments.len(), 4);
    }

    #[tokio::test]
    async fn test_past_queries_are_scoped() {
        let retriever = SemanticRetriever::new(Arc::new(HashingEmbedder::default()));
        retriever
            .record_query(
                "total sales by region",
                "SELECT region, SUM(sales) FROM data GROUP BY region",
                &Scope::dataset("orders"),
            )
            .await
            .unwrap();

        let same = retriever
            .retrieve("sales by region", &Scope::dataset("orders"), &schema())
            .await;
        assert_eq!(same.similar_queries.len(), 1);

        let other = retriever
            .retrieve("sales by region", &Scope::dataset("hr"), &schema())
            .await;
        assert!(other.similar_queries.is_empty());
    }

    #[tokio::test]
    async fn test_terms_and_forget() {
        let retriever = SemanticRetriever::new(Arc::new(HashingEmbedder::default()));
        retriever
            .add_term("churn", "customers with no order in 90 days", &Scope::global())
            .await
            .unwrap();
        retriever.index_schema(&dataset("orders"), &schema()).await.unwrap();

        let ctx = retriever
            .retrieve("how many churn customers", &Scope::dataset("orders"), &schema())
            .await;
        assert_eq!(ctx.business_terms[0].term, "churn");

        retriever.forget_dataset("orders");
        assert_eq!(retriever.sizes(), (0, 0, 1));
    }

    #[tokio::test]
    async fn test_forget_drops_past_queries() {
        let retriever = SemanticRetriever::new(Arc::new(HashingEmbedder::default()));
        let scope = Scope::dataset("orders");
        retriever
            .record_query("total sales by region", "SELECT region, SUM(sales) FROM data GROUP BY region", &scope)
            .await
            .unwrap();
        retriever
            .record_query("row count", "SELECT COUNT(*) FROM data", &Scope::dataset("hr"))
            .await
            .unwrap();

        retriever.forget_dataset("orders");

        let ctx = retriever.retrieve("total sales by region", &scope, &schema()).await;
        assert!(ctx.similar_queries.is_empty());
        assert_eq!(retriever.sizes().1, 1);
    }
}
