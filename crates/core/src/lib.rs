pub mod chunking;
pub mod confidence;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
mod persistence;
pub mod retriever;
pub mod synthesis;
pub mod traits;

pub use chunking::{chunk_pages, normalize_whitespace, ChunkingConfig};
pub use confidence::ConfidenceConfig;
pub use config::{load_config, EngineConfig};
pub use embeddings::{
    create_embedder, CharacterNgramEmbedder, EmbeddingConfig, EmbeddingProvider, OllamaEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ChunkingError, ConfigError, EmbeddingError, ExtractionError, IndexError, IngestError,
    QueryError, SynthesisError,
};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{IndexConfig, IndexStats, SearchHit, StagedEntry, VectorIndex};
pub use ingest::{discover_pdf_files, document_id_for_path, IngestionPipeline};
pub use llm::{create_generator, ExtractiveGenerator, GeneratorConfig, GeneratorProvider, OllamaGenerator};
pub use models::{Citation, Document, DocumentStatus, Embedding, IndexReport, QueryResult, Unit};
pub use orchestrator::{Engine, QueryPipeline};
pub use retriever::{RetrievalConfig, RetrievedUnit, Retriever};
pub use synthesis::{SynthesisConfig, Synthesizer};
pub use traits::{Embedder, LanguageModel};
