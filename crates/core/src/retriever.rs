use crate::error::QueryError;
use crate::index::VectorIndex;
use crate::models::Unit;
use crate::traits::Embedder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_similarity: f32,
    /// Surface an empty index as an error instead of an empty result.
    pub strict_empty_index: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.25,
            strict_empty_index: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedUnit {
    pub unit: Unit,
    pub score: f32,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn retrieve(&self, query: &str) -> Result<Vec<RetrievedUnit>, QueryError> {
        self.retrieve_top(query, self.config.top_k)
    }

    /// Best `k` units at or above the similarity threshold, best first.
    /// Fewer than `k` (or none) is a valid outcome.
    pub fn retrieve_top(&self, query: &str, k: usize) -> Result<Vec<RetrievedUnit>, QueryError> {
        let vector = self.embedder.embed(query)?;
        let hits = self
            .index
            .search_with(&vector, k, self.config.strict_empty_index)?;
        let candidates = hits.len();

        let retrieved = hits
            .into_iter()
            .filter(|hit| hit.score >= self.config.min_similarity)
            .map(|hit| RetrievedUnit {
                unit: hit.unit,
                score: hit.score,
            })
            .collect::<Vec<_>>();

        debug!(
            candidates,
            kept = retrieved.len(),
            threshold = self.config.min_similarity,
            "retrieved units"
        );
        Ok(retrieved)
    }
}
