//! Embedding generation — TF hash-based implementation.
//!
//! Maps normalized message text to fixed-length vectors for density
//! clustering. Deterministic for a fixed model version and input: batch
//! size never changes output values, and running twice yields bit-identical
//! vectors.

use md5::{Digest, Md5};

use crate::constants::{EMBEDDING_DIM, EMBEDDING_MODEL_VERSION};
use crate::{AnalysisError, AnalysisResult};

/// One embedding per normalized message with non-empty content.
#[derive(Debug, Clone)]
pub struct EmbeddingVector {
    /// Back-reference to the embedded message, not ownership.
    pub message_id: i64,
    pub vector: Vec<f32>,
    pub model_version: String,
}

/// Boundary contract for the embedding backend.
///
/// Guarantees: one vector per input string, same order, constant
/// dimensionality per `model_version`, no randomness.
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier recorded in every produced vector.
    fn model_version(&self) -> &str;

    /// Embed a batch. Fails with `EmptyBatch` on zero inputs and
    /// `ModelUnavailable` when the backend cannot be reached or loaded.
    fn embed_batch(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>>;
}

impl<B: EmbeddingBackend + ?Sized> EmbeddingBackend for std::sync::Arc<B> {
    fn model_version(&self) -> &str {
        self.as_ref().model_version()
    }

    fn embed_batch(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>> {
        self.as_ref().embed_batch(texts)
    }
}

/// Hash-projected term-frequency embedder.
///
/// Each unigram and bigram is hashed (MD5) into two positions of a
/// fixed-dimension vector with a hash-derived sign; the result is
/// L2-normalized. No model file to load, fully deterministic.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self { dim: EMBEDDING_DIM }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];

        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();

        if words.is_empty() {
            return vector;
        }

        // Unigrams
        for word in &words {
            let w = word.trim_matches(|c: char| !c.is_alphanumeric());
            if w.chars().count() < 2 {
                continue;
            }
            hash_term_into(&mut vector, w, 1.0);
        }

        // Bigrams
        for pair in words.windows(2) {
            let bigram = format!(
                "{}_{}",
                pair[0].trim_matches(|c: char| !c.is_alphanumeric()),
                pair[1].trim_matches(|c: char| !c.is_alphanumeric())
            );
            hash_term_into(&mut vector, &bigram, 0.7);
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingBackend for HashEmbedder {
    fn model_version(&self) -> &str {
        EMBEDDING_MODEL_VERSION
    }

    fn embed_batch(&self, texts: &[&str]) -> AnalysisResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(AnalysisError::EmptyBatch);
        }
        tracing::debug!(batch = texts.len(), dim = self.dim, "Embedding batch");
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Hash a term into a fixed-dimension vector using MD5.
fn hash_term_into(vector: &mut [f32], term: &str, weight: f32) {
    let mut hasher = Md5::new();
    hasher.update(term.as_bytes());
    let hash = hasher.finalize();

    // First 4 bytes pick the index, fifth byte the sign
    let idx = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]) as usize % vector.len();
    let sign = if hash[4] & 1 == 0 { 1.0f32 } else { -1.0f32 };
    vector[idx] += sign * weight;

    // Second position for better distribution
    let idx2 = u32::from_le_bytes([hash[5], hash[6], hash[7], hash[8]]) as usize % vector.len();
    let sign2 = if hash[9] & 1 == 0 { 1.0f32 } else { -1.0f32 };
    vector[idx2] += sign2 * weight * 0.5;
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
