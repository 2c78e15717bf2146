//! Capability traits: the injected collaborators that form the crate's
//! external seams. No concrete networked implementation ships here —
//! hosts provide their own.
use async_trait::async_trait;

/// Text → vector embedding generation.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate a single embedding for `text`.
    async fn generate(&self, text: &str) -> Result<Vec<f64>, String>;

    /// Generate embeddings for a batch of texts, preserving order.
    async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, String> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.generate(t).await?);
        }
        Ok(out)
    }

    /// Describe the underlying model.
    async fn model_info(&self) -> EmbeddingModelInfo;

    /// Perform any one-time setup (connection warm-up, model load).
    async fn initialize(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingModelInfo {
    pub name: String,
    pub dimension: usize,
    pub ready: bool,
}

/// A single candidate passed to a `CrossEncoder` for reranking.
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub text: String,
    pub index: usize,
}

/// A ranked score returned by a `CrossEncoder`.
#[derive(Debug, Clone)]
pub struct RerankScore {
    pub index: usize,
    pub score: f64,
}

/// Query-aware reranking of an ordered candidate set.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn rank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankScore>, String>;
}
