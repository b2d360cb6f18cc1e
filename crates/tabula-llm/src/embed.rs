//! Embedding contract and an offline embedder.

use async_trait::async_trait;
use rustc_hash::FxHasher;
use std::hash::Hasher;

use crate::LlmError;

/// Vector width of [`HashingEmbedder`].
pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// Turns text into a dense vector for nearest-neighbour lookup.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Deterministic bag-of-features embedder.
///
/// Word tokens and character trigrams are hashed into a fixed number of
/// buckets and the result is L2-normalised. No network, same output for the
/// same text on every run.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Synchronous embedding; never fails.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dim];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.bump(&mut vector, word.as_bytes(), 1.0);

            let chars: Vec<char> = format!("#{}#", word).chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                self.bump(&mut vector, gram.as_bytes(), 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn bump(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let mut hasher = FxHasher::default();
        hasher.write(feature);
        let hash = hasher.finish();
        let bucket = (hash % self.dim as u64) as usize;
        // Sign bit spreads collisions around zero
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed_text(text))
    }
}

/// Cosine similarity between two vectors. Mismatched or empty inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
