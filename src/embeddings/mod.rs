// Embeddings module
// Defines the embedding-function seam and the Ollama implementation

pub mod ollama;

use async_trait::async_trait;

pub use ollama::OllamaClient;

/// A model that maps text to fixed-length vectors.
///
/// The name and vector width determine which table a store binds to, so two
/// functions with the same name must produce vectors of the same width.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    /// Stable identifier of the model, used in table naming
    fn name(&self) -> &str;

    /// Number of dimensions of every vector returned by `embed`
    fn vector_width(&self) -> usize;

    /// Embed each text, returning one vector per input in the same order
    async fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>>;
}
