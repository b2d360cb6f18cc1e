//! Brute-force scoped vector index.

use tabula_llm::cosine_similarity;
use tabula_types::Scope;

struct Entry<T> {
    key: String,
    scope: Scope,
    embedding: Vec<f32>,
    payload: T,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<'a, T> {
    pub score: f32,
    pub payload: &'a T,
}

/// In-memory index with exact cosine search.
pub struct VectorIndex<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for VectorIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> VectorIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing one with the same key and scope.
    pub fn upsert(&mut self, key: impl Into<String>, scope: Scope, embedding: Vec<f32>, payload: T) {
        let key = key.into();
        match self
            .entries
            .iter_mut()
            .find(|e| e.key == key && e.scope == scope)
        {
            Some(entry) => {
                entry.embedding = embedding;
                entry.payload = payload;
            }
            None => self.entries.push(Entry {
                key,
                scope,
                embedding,
                payload,
            }),
        }
    }

    /// Top `k` entries visible under `scope`, best first. Ties keep insertion order.
    pub fn search(&self, query: &[f32], scope: &Scope, k: usize, min_score: f32) -> Vec<Scored<'_, T>> {
        let mut hits: Vec<Scored<'_, T>> = self
            .entries
            .iter()
            .filter(|e| e.scope.admits(scope))
            .map(|e| Scored {
                score: cosine_similarity(query, &e.embedding),
                payload: &e.payload,
            })
            .filter(|s| s.score >= min_score)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }

    /// Remove every entry whose scope matches `pred`. Returns how many went.
    pub fn remove_where(&mut self, pred: impl Fn(&Scope) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(&e.scope));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
