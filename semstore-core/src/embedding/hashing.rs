//! Feature-hashing embedder.
//!
//! Projects words, adjacent word pairs and character trigrams into a fixed
//! number of buckets with a signed hash, then L2-normalizes. Texts sharing
//! vocabulary land close together under cosine distance. No model download,
//! no network, fully deterministic.

use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::distance::normalize_in_place;
use crate::error::{Error, Result};
use crate::index::text::tokenize;

const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.25;

/// Seed for the hash deciding a feature's sign.
const SIGN_SEED: u32 = 0x9e37_79b9;

/// Local deterministic embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Configuration(
                "hashing embedder dimension must be at least 1".into(),
            ));
        }
        Ok(Self { dimension })
    }

    /// Synchronous embedding; the async trait method delegates here.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let words = tokenize(text);

        if words.is_empty() {
            let fallback = text.trim().to_lowercase();
            self.add_feature(&mut vector, &fallback, WORD_WEIGHT);
        }

        for word in &words {
            self.add_feature(&mut vector, word, WORD_WEIGHT);

            let chars: Vec<char> = format!("<{}>", word).chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &format!("#{}", gram), TRIGRAM_WEIGHT);
            }
        }
        for pair in words.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        normalize_in_place(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let bucket = crc32fast::hash(feature.as_bytes()) as usize % self.dimension;

        let mut hasher = crc32fast::Hasher::new_with_initial(SIGN_SEED);
        hasher.update(feature.as_bytes());
        let sign = if hasher.finalize() & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
