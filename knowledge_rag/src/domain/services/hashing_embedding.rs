use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::embeddings::{EmbeddingsService, EmbeddingsServiceError};
use crate::domain::entities::embedding_point::Embeddings;

/// Embeddings from feature hashing: each lower-cased word adds +1 or -1 to one of the
/// `dimension` buckets, then the vector is L2 normalized.
///
/// No model to download and fully deterministic: texts sharing words are close,
/// texts without any common word are (almost) orthogonal.
/// Used for tests and for running without the sentence embeddings model.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingsService {
    dimension: usize,
}

impl HashingEmbeddingsService {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Embeddings {
        let mut embeddings = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embeddings[bucket] += sign;
        }

        let norm: f32 = embeddings.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embeddings.iter_mut().for_each(|x| *x /= norm);
        }

        embeddings
    }
}

#[async_trait]
impl EmbeddingsService for HashingEmbeddingsService {
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[tracing::instrument(name = "Generate hashed embeddings", skip(self))]
    async fn encode_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Embeddings>, EmbeddingsServiceError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

/// Lower-cased words made of letters and digits
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());
    RE.find_iter(text).map(|token| token.as_str().to_lowercase())
}
