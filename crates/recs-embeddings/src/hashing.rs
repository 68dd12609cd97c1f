//! Deterministic feature-hashing embedder.
//!
//! No model files and no network: every lowercase word and each of its
//! character trigrams is hashed to a signed one-hot vector, the feature
//! vectors are mean pooled, and the result is L2 normalized. Texts that share
//! words or word fragments ("cat", "cats") land close together, which is
//! enough for offline operation and for exercising the engine in tests.

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature used when the text has no word characters at all
const EMPTY_FEATURE: &str = "\u{0}empty";

/// Feature-hashing embedder with a configurable dimension.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    info: ModelInfo,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            info: ModelInfo {
                name: format!("feature-hashing-{}", dimension),
                dimension,
                max_sequence_length: usize::MAX,
            },
        })
    }

    fn accumulate(&self, feature: &str, sums: &mut [f32]) {
        let hash = fnv1a(feature.as_bytes());
        let index = (hash % sums.len() as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        sums[index] += sign;
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut sums = vec![0.0f32; self.info.dimension];
        let mut features = 0usize;

        for word in words(text) {
            self.accumulate(&word, &mut sums);
            features += 1;

            let padded: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.accumulate(&gram, &mut sums);
                features += 1;
            }
        }

        // Signed buckets can cancel out completely; fall back to the sentinel
        // so every text still has a direction.
        if features == 0 || sums.iter().all(|v| *v == 0.0) {
            self.accumulate(EMPTY_FEATURE, &mut sums);
            features = 1;
        }

        // Mean pooling, then unit length.
        let count = features as f32;
        let pooled: Vec<f32> = sums.into_iter().map(|v| v / count).collect();
        Ok(Embedding::new(pooled))
    }
}

/// Lowercase alphanumeric runs of the text
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}
