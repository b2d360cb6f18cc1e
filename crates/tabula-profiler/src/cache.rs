//! Shared schema cache.
//!
//! Read-mostly and keyed by dataset identity. Each entry is a one-shot cell,
//! so concurrent first access profiles a dataset exactly once while the
//! other callers wait for that result. No map lock is held while profiling.

use dashmap::DashMap;
use std::sync::Arc;
use tabula_types::{Dataset, SchemaProfile};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::profile;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profiling task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

struct Slot {
    /// Data version the cell was created for
    fingerprint: String,
    cell: Arc<OnceCell<Arc<SchemaProfile>>>,
}

impl Slot {
    fn new(fingerprint: &str) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            cell: Arc::new(OnceCell::new()),
        }
    }
}

/// Schema profiles by dataset id.
#[derive(Default)]
pub struct SchemaCache {
    entries: DashMap<String, Slot>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached profile, computing it on first access.
    ///
    /// A dataset whose content changed under the same id is re-profiled.
    pub async fn get_or_profile(&self, dataset: &Dataset) -> Result<Arc<SchemaProfile>, ProfileError> {
        let cell = {
            let mut slot = self
                .entries
                .entry(dataset.id.clone())
                .or_insert_with(|| Slot::new(&dataset.fingerprint));
            if slot.fingerprint != dataset.fingerprint {
                debug!(dataset = %dataset.id, "dataset content changed, re-profiling");
                *slot = Slot::new(&dataset.fingerprint);
            }
            Arc::clone(&slot.cell)
        };

        let cached = cell
            .get_or_try_init(|| {
                let data = Arc::clone(&dataset.data);
                let id = dataset.id.clone();
                async move {
                    let computed = tokio::task::spawn_blocking(move || profile(&data)).await?;
                    info!(
                        dataset = %id,
                        columns = computed.columns.len(),
                        rows = computed.row_count,
                        "schema profiled"
                    );
                    Ok::<_, ProfileError>(Arc::new(computed))
                }
            })
            .await?;

        Ok(Arc::clone(cached))
    }

    /// Cached profile, if one has been computed.
    pub fn get(&self, dataset_id: &str) -> Option<Arc<SchemaProfile>> {
        self.entries
            .get(dataset_id)
            .and_then(|slot| slot.cell.get().cloned())
    }

    /// Drop the entry for a dataset. Returns whether one existed.
    pub fn invalidate(&self, dataset_id: &str) -> bool {
        let removed = self.entries.remove(dataset_id).is_some();
        if removed {
            debug!(dataset = %dataset_id, "schema cache entry invalidated");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_types::{TabularData, Value};

    fn dataset(id: &str, values: &[i64]) -> Dataset {
        let rows = values.iter().map(|v| vec![Value::Int(*v)]).collect();
        Dataset::new(id, TabularData::new(vec!["n".into()], rows))
    }

    #[tokio::test]
    async fn test_profile_cached() {
        let cache = SchemaCache::new();
        let ds = dataset("a", &[1, 2, 3]);
        let first = cache.get_or_profile(&ds).await.unwrap();
        let second = cache.get_or_profile(&ds).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.get("a").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_profiles_once() {
        let cache = Arc::new(SchemaCache::new());
        let ds = dataset("shared", &(0..500).collect::<Vec<_>>());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let ds = ds.clone();
                tokio::spawn(async move { cache.get_or_profile(&ds).await.unwrap() })
            })
            .collect();

        let mut profiles = Vec::new();
        for h in handles {
            profiles.push(h.await.unwrap());
        }
        assert!(profiles.iter().all(|p| Arc::ptr_eq(p, &profiles[0])));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reprofile() {
        let cache = SchemaCache::new();
        let ds = dataset("a", &[1, 2]);
        let first = cache.get_or_profile(&ds).await.unwrap();

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(cache.get("a").is_none());

        let second = cache.get_or_profile(&ds).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn test_changed_content_reprofiles() {
        let cache = SchemaCache::new();
        let v1 = cache.get_or_profile(&dataset("a", &[1, 2])).await.unwrap();
        let v2 = cache.get_or_profile(&dataset("a", &[1, 2, 3])).await.unwrap();
        assert_eq!(v1.row_count, 2);
        assert_eq!(v2.row_count, 3);
    }
}
