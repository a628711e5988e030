use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// An uploaded document as tracked by the ingestion pipeline.
///
/// The record store outside the core persists this; the pipeline only moves it
/// through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub checksum: Option<String>,
    pub status: DocumentStatus,
    pub chunks_indexed: usize,
    pub generation: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            checksum: None,
            status: DocumentStatus::Pending,
            chunks_indexed: 0,
            generation: 0,
            error_message: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn begin_processing(&mut self) -> Result<(), IngestError> {
        match self.status {
            DocumentStatus::Pending => {
                self.status = DocumentStatus::Processing;
                self.error_message = None;
                Ok(())
            }
            // A crashed worker leaves the record in processing; retries pick it up again.
            DocumentStatus::Processing => Ok(()),
            other => Err(IngestError::InvalidState(format!(
                "document {} is {}; call reingest() before indexing it again",
                self.id,
                other.as_str()
            ))),
        }
    }

    pub fn complete(&mut self, chunks_indexed: usize) {
        self.status = DocumentStatus::Completed;
        self.chunks_indexed = chunks_indexed;
        self.processed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = DocumentStatus::Failed;
        self.error_message = Some(reason.into());
        self.processed_at = Some(Utc::now());
    }

    /// Starts a new index generation for a completed or failed document.
    pub fn reingest(&mut self) {
        if self.status.is_terminal() {
            self.generation = self.generation.saturating_add(1);
        }
        self.status = DocumentStatus::Pending;
        self.error_message = None;
    }
}

/// A retrievable span of document text with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    pub unit_id: String,
    pub document_id: String,
    pub document_name: String,
    pub ordinal: u64,
    pub text: String,
    pub page_start: u32,
    pub page_end: u32,
    pub section: Option<String>,
    /// Char offset of the unit start within `page_start`.
    pub char_start: usize,
    /// Exclusive char offset of the unit end within `page_end`.
    pub char_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    pub model_id: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub marker: usize,
    pub unit_id: String,
    pub document_id: String,
    pub document_name: String,
    pub section: Option<String>,
    pub page: u32,
    pub page_end: u32,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: String,
    pub chunks_indexed: usize,
    pub status: DocumentStatus,
    pub pages: usize,
    pub empty_pages: usize,
    pub generation: u32,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_through_processing_to_completed() {
        let mut document = Document::with_id("doc-1", "act.pdf");
        document.begin_processing().expect("pending document can start");
        assert_eq!(document.status, DocumentStatus::Processing);

        document.complete(7);
        assert_eq!(document.status, DocumentStatus::Completed);
        assert_eq!(document.chunks_indexed, 7);
        assert!(document.processed_at.is_some());
    }

    #[test]
    fn completed_document_requires_reingest() {
        let mut document = Document::with_id("doc-1", "act.pdf");
        document.begin_processing().expect("pending document can start");
        document.complete(3);

        assert!(matches!(
            document.begin_processing(),
            Err(IngestError::InvalidState(_))
        ));

        document.reingest();
        assert_eq!(document.generation, 1);
        assert_eq!(document.status, DocumentStatus::Pending);
        assert!(document.begin_processing().is_ok());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Completed).expect("serialize");
        assert_eq!(json, "\"completed\"");
    }
}
