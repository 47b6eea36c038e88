use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingBackend;
use crate::error::EmbeddingResult;
use crate::text::tokenize;

/// Deterministic local embedding model based on feature hashing.
///
/// Word unigrams and character trigrams are hashed into `dimension` signed
/// buckets and the result is L2-normalised. Texts that share vocabulary get
/// high cosine similarity, unrelated texts land near zero. No network, no
/// model weights, identical output on every platform.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model_id: String,
    dimension: usize,
}

impl HashingEmbedder {
    /// Create a hashing embedder of the given dimension.
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension: dimension.max(1),
        }
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let words = tokenize(text);

        for word in &words {
            self.accumulate(&mut vector, "w", word, 1.0);
            let chars: Vec<char> = format!("#{}#", word).chars().collect();
            if chars.len() >= 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    self.accumulate(&mut vector, "c", &gram, 0.35);
                }
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

    fn accumulate(&self, vector: &mut [f32], namespace: &str, feature: &str, weight: f32) {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();

        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
