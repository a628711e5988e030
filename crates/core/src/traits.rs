use crate::error::{EmbeddingError, SynthesisError};
use crate::llm::GenerationRequest;

/// A text embedding model.
///
/// Implementations must be deterministic for a fixed model id and input, and
/// must return one vector of `dimensions()` length per input, in input order.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("model returned no vector".to_string()))
    }
}

/// A text generator that answers from supplied passages only.
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn generate(&self, request: &GenerationRequest) -> Result<String, SynthesisError>;
}
