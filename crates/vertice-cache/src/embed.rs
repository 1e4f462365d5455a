//! The embed capability consumed by the semantic cache.

use async_trait::async_trait;

/// Produces a fixed-dimensionality embedding for a piece of text. The
/// router and mixin never construct embeddings themselves — they always
/// go through an injected `Embedder`, per the design note that the
/// "default embedder" must never be assumed by calling code.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Vec<f32>;

    /// Dimensionality of vectors this embedder produces.
    fn dimensions(&self) -> usize;
}

/// Stable pseudo-embedding derived from a cryptographic hash. Deterministic
/// and dependency-free, suitable only for tests — production deployments
/// must inject a real embedding service (e.g. `vertice_llm::embedding`).
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Vec<f32> {
        let normalized = text.trim().to_lowercase();
        let mut out = Vec::with_capacity(self.dims);
        let mut counter: u64 = 0;
        while out.len() < self.dims {
            let mut input = normalized.as_bytes().to_vec();
            input.extend_from_slice(&counter.to_le_bytes());
            let digest = blake3::hash(&input);
            for byte in digest.as_bytes() {
                if out.len() >= self.dims {
                    break;
                }
                // Map byte into [-1.0, 1.0].
                out.push((*byte as f32 / 127.5) - 1.0);
            }
            counter += 1;
        }
        out
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// A fixed embed function keyed on the presence of one keyword: any text
/// containing `keyword` (case-insensitive) maps to the same vector,
/// everything else maps to a distinct fixed vector. Exists for semantic
/// cache deployments where topic membership, not fine-grained similarity,
/// drives hits — e.g. treating every query that mentions "python" as a
/// match regardless of the rest of the sentence.
pub struct KeywordEmbedder {
    keyword: String,
    dims: usize,
}

impl KeywordEmbedder {
    pub fn new(keyword: impl Into<String>, dims: usize) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
            dims,
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Vec<f32> {
        let matched = text.to_lowercase().contains(&self.keyword);
        let value = if matched { 1.0 } else { -1.0 };
        vec![value; self.dims]
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Cosine similarity of two vectors; zero-norm vectors yield 0.0 rather
/// than NaN, per `spec.md` §4.4.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for i in 0..n {
        let x = a[i] as f64;
        let y = b[i] as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
