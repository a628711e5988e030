use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf is unreadable: {0}")]
    Unreadable(String),

    #[error("pdf is encrypted and no password was supplied")]
    Encrypted,
}

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    #[error("document has no extractable text to chunk")]
    EmptyInput,

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("embedding dimension {actual} does not match configured dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid response from embedding model: {0}")]
    InvalidResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding model {actual} does not match index model {expected}")]
    ModelMismatch { expected: String, actual: String },

    #[error("index holds no entries")]
    EmptyIndex,

    #[error("index data is corrupt: {0}")]
    Corruption(String),

    #[error("index has no persistence path configured")]
    NotPersistent,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("language model call failed: {0}")]
    Generation(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("answer cites passage [{marker}] but only {supplied} passages were supplied")]
    UnsupportedCitation { marker: usize, supplied: usize },

    #[error("language model returned an empty answer")]
    EmptyAnswer,

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("chunking failed: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index update failed: {0}")]
    Index(#[from] IndexError),

    #[error("invalid document state: {0}")]
    InvalidState(String),
}

impl IngestError {
    /// Whether a caller may retry the same ingestion unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Embedding(error) => error.is_transient(),
            Self::Extraction(ExtractionError::Io(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index search failed: {0}")]
    Index(#[from] IndexError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

impl QueryError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Embedding(error) => error.is_transient(),
            Self::Synthesis(SynthesisError::Generation(_) | SynthesisError::Http(_)) => true,
            _ => false,
        }
    }
}

impl EmbeddingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_) | Self::Http(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("index could not be opened: {0}")]
    Index(#[from] IndexError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
