//! Accepted-plan caching for repeated questions.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tabula_types::AnalysisPlan;
use thiserror::Error;
use tracing::debug;

/// Cache for accepted analysis plans.
pub struct PlanCache {
    /// Persist entries here when set
    cache_dir: Option<PathBuf>,
    /// In-memory cache
    memory: RwLock<HashMap<String, AnalysisPlan>>,
}

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlanCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            cache_dir: None,
            memory: RwLock::default(),
        }
    }

    /// A cache that also persists entries under `cache_dir`.
    pub fn persistent(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir: Some(cache_dir),
            memory: RwLock::default(),
        }
    }

    /// Cache key from the dataset version and the question.
    ///
    /// Questions differing only in case or whitespace share a key.
    pub fn cache_key(fingerprint: &str, question: &str) -> String {
        let normalized = question
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update(b":");
        hasher.update(normalized.as_bytes());
        let result = hasher.finalize();
        base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, result)
    }

    /// Get a cached plan.
    pub fn get(&self, key: &str) -> Option<AnalysisPlan> {
        // Check memory cache first
        if let Some(plan) = read(&self.memory).get(key) {
            return Some(plan.clone());
        }

        // Check disk cache
        let path = self.path(key)?;
        let content = fs::read_to_string(path).ok()?;
        let plan: AnalysisPlan = serde_json::from_str(&content).ok()?;
        write(&self.memory).insert(key.to_string(), plan.clone());
        Some(plan)
    }

    /// Store a plan in the cache.
    pub fn set(&self, key: &str, plan: &AnalysisPlan) -> Result<(), CacheError> {
        write(&self.memory).insert(key.to_string(), plan.clone());

        if let (Some(dir), Some(path)) = (&self.cache_dir, self.path(key)) {
            fs::create_dir_all(dir)?;
            fs::write(path, serde_json::to_string_pretty(plan)?)?;
        }
        debug!(key, "plan cached");
        Ok(())
    }

    /// Remove a plan that no longer validates or executes.
    pub fn evict(&self, key: &str) -> Result<(), CacheError> {
        write(&self.memory).remove(key);
        if let Some(path) = self.path(key) {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        debug!(key, "plan evicted");
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        read(&self.memory).contains_key(key) || self.path(key).is_some_and(|p| p.exists())
    }

    /// Clear the cache.
    pub fn clear(&self) -> Result<(), CacheError> {
        write(&self.memory).clear();

        if let Some(dir) = &self.cache_dir {
            if dir.exists() {
                for entry in fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.to_string_lossy().ends_with(".plan.json") {
                        fs::remove_file(path)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.plan.json", key)))
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
