use crate::config::EngineConfig;
use crate::embeddings::create_embedder;
use crate::error::{ConfigError, IndexError, IngestError, QueryError};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::{IndexConfig, IndexStats, VectorIndex};
use crate::ingest::IngestionPipeline;
use crate::llm::create_generator;
use crate::models::{Document, IndexReport, QueryResult};
use crate::retriever::Retriever;
use crate::synthesis::Synthesizer;
use crate::traits::{Embedder, LanguageModel};
use std::io::Read;
use std::sync::Arc;
use tracing::info;

pub struct QueryPipeline {
    retriever: Retriever,
    synthesizer: Synthesizer,
}

impl QueryPipeline {
    pub fn new(retriever: Retriever, synthesizer: Synthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }

    pub fn query(&self, text: &str) -> Result<QueryResult, QueryError> {
        self.query_top(text, self.retriever.config().top_k)
    }

    /// Answers `text` from at most `top_k` qualifying units.
    pub fn query_top(&self, text: &str, top_k: usize) -> Result<QueryResult, QueryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let retrieved = self.retriever.retrieve_top(text, top_k)?;
        let result = self.synthesizer.synthesize(text, &retrieved)?;
        info!(
            hits = retrieved.len(),
            citations = result.citations.len(),
            confidence = result.confidence,
            "answered query"
        );
        Ok(result)
    }
}

/// One index shared by an ingestion and a query pipeline.
pub struct Engine {
    index: Arc<VectorIndex>,
    ingestion: IngestionPipeline,
    queries: QueryPipeline,
}

impl Engine {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let embedder = create_embedder(&config.embedding)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;
        let model = create_generator(&config.generator)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;
        Self::with_components(config, Box::new(LopdfExtractor), embedder, model)
    }

    /// Builds an engine around caller-supplied components; the index is
    /// opened from `config.index.path` when set.
    pub fn with_components(
        config: &EngineConfig,
        extractor: Box<dyn PdfExtractor + Send + Sync>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let index = Arc::new(VectorIndex::open(IndexConfig {
            dimensions: embedder.dimensions(),
            model_id: embedder.model_id().to_string(),
            path: config.index.path.clone(),
        })?);
        info!(
            model = embedder.model_id(),
            generator = model.model_id(),
            entries = index.len(),
            "engine ready"
        );

        let ingestion = IngestionPipeline::with_extractor(
            extractor,
            Arc::clone(&embedder),
            Arc::clone(&index),
            config.chunking.clone(),
            config.embedding.batch_size,
        );
        let queries = QueryPipeline::new(
            Retriever::new(embedder, Arc::clone(&index), config.retrieval.clone()),
            Synthesizer::new(model, config.synthesis.clone()),
        );

        Ok(Self {
            index,
            ingestion,
            queries,
        })
    }

    pub fn ingest(&self, document: &mut Document, content: impl Read) -> Result<IndexReport, IngestError> {
        self.ingestion.ingest(document, content)
    }

    pub fn query(&self, text: &str) -> Result<QueryResult, QueryError> {
        self.queries.query(text)
    }

    pub fn query_top(&self, text: &str, top_k: usize) -> Result<QueryResult, QueryError> {
        self.queries.query_top(text, top_k)
    }

    pub fn remove(&self, document_id: &str) -> usize {
        self.ingestion.remove(document_id)
    }

    pub fn persist(&self) -> Result<(), IndexError> {
        self.index.persist()
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}
