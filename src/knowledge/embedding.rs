//! Embedders turn text into fixed-size vectors.
//!
//! - `HashEmbedder` hashes lowercase word tokens into buckets with 64-bit
//!   FNV-1a. Deterministic across builds and platforms, and offline.
//! - `RigEmbedder` calls a hosted embedding model through rig-core.
//!
//! Every embedder reports an [`Embedder::id`]; the knowledge store records
//! it next to each vector and refuses to compare vectors from different ids.

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;

use crate::error::KnowledgeError;

/// Default dimensionality of [`HashEmbedder`] vectors.
pub const HASH_EMBEDDING_DIMENSIONS: usize = 384;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Converts text into an embedding vector.
///
/// Ingestion and search must use the same embedder, otherwise scores are
/// meaningless.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError>;

    /// Stable name of the embedding function, including anything that
    /// changes its output space (model, dimensionality).
    fn id(&self) -> String;
}

/// 64-bit FNV-1a over the UTF-8 bytes of `token`.
fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Hashed bag-of-words embedder.
///
/// Each token adds ±1 to one bucket (sign taken from the top hash bit);
/// the result is L2-normalized. Text with no tokens yields the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::with_dimensions(HASH_EMBEDDING_DIMENSIONS)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in Self::tokens(text) {
            let h = fnv1a(&token);
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
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

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        Ok(self.hash_to_vector(text))
    }

    fn id(&self) -> String {
        format!("hash-fnv1a/{}", self.dimensions)
    }
}

/// Embedder backed by a rig-core embedding model.
pub struct RigEmbedder<M> {
    model: M,
    model_name: String,
}

impl<M: EmbeddingModel> RigEmbedder<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> Embedder for RigEmbedder<M>
where
    M: EmbeddingModel + 'static,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let embedding =
            self.model
                .embed_text(text)
                .await
                .map_err(|e| KnowledgeError::EmbeddingFailed {
                    reason: format!("{}: {e}", self.model_name),
                })?;
        Ok(embedding.vec.into_iter().map(|x| x as f32).collect())
    }

    fn id(&self) -> String {
        format!("rig/{}", self.model_name)
    }
}

/// Build an OpenAI-backed embedder.
pub fn create_openai_embedder(
    api_key: &secrecy::SecretString,
    model: &str,
) -> Result<std::sync::Arc<dyn Embedder>, KnowledgeError> {
    use rig::client::EmbeddingsClient;
    use rig::providers::openai;
    use secrecy::ExposeSecret;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(api_key.expose_secret()).map_err(|e| {
            KnowledgeError::EmbeddingFailed {
                reason: format!("Failed to create OpenAI client: {e}"),
            }
        })?;

    let embedding_model = client.embedding_model(model);
    tracing::info!("Using OpenAI embeddings (model: {})", model);
    Ok(std::sync::Arc::new(RigEmbedder::new(embedding_model, model)))
}

/// Cosine similarity of two vectors. Mismatched lengths or a zero vector score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
