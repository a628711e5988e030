//! Engine configuration loaded from a TOML file.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working offline setup: trigram embeddings, extractive
//! answers and an in-memory index.
//!
//! ```toml
//! [index]
//! path = "legal-index.json"
//!
//! [chunking]
//! unit_chars = 1200
//! overlap_chars = 150
//! min_unit_chars = 50
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dimensions = 768
//!
//! [retrieval]
//! top_k = 5
//! min_similarity = 0.25
//!
//! [generator]
//! provider = "extractive"
//! ```

use crate::chunking::ChunkingConfig;
use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;
use crate::llm::GeneratorConfig;
use crate::retriever::RetrievalConfig;
use crate::synthesis::SynthesisConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Snapshot file; `None` keeps the index in memory only.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub index: IndexSection,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub generator: GeneratorConfig,
    pub synthesis: SynthesisConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking
            .validate()
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(ConfigError::Invalid(format!(
                "retrieval.min_similarity must be within [0, 1], got {}",
                self.retrieval.min_similarity
            )));
        }

        let largest_unit = self.chunking.max_unit_chars();
        if self.synthesis.max_context_chars < largest_unit {
            return Err(ConfigError::Invalid(format!(
                "synthesis.max_context_chars ({}) must fit at least one unit ({largest_unit} chars)",
                self.synthesis.max_context_chars
            )));
        }

        let confidence = &self.synthesis.confidence;
        let weights = [
            ("top_weight", confidence.top_weight),
            ("coverage_weight", confidence.coverage_weight),
            ("agreement_weight", confidence.agreement_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "synthesis.confidence.{name} must be a non-negative number"
                )));
            }
        }
        for (name, bound) in [
            ("uncited_ceiling", confidence.uncited_ceiling),
            ("floor", confidence.floor),
        ] {
            if !(0.0..=1.0).contains(&bound) {
                return Err(ConfigError::Invalid(format!(
                    "synthesis.confidence.{name} must be within [0, 1]"
                )));
            }
        }

        Ok(())
    }
}

/// Reads and validates a config file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}
