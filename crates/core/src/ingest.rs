use crate::chunking::{chunk_pages, ChunkingConfig};
use crate::embeddings::embed_in_batches;
use crate::error::IngestError;
use crate::extractor::{read_pdf, LopdfExtractor, PdfExtractor};
use crate::index::{StagedEntry, VectorIndex};
use crate::models::{Document, DocumentStatus, Embedding, IndexReport};
use crate::traits::Embedder;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stable document id for a file path, so re-ingesting a file replaces its entries.
pub fn document_id_for_path(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct IngestionPipeline {
    extractor: Box<dyn PdfExtractor + Send + Sync>,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self::with_extractor(Box::new(LopdfExtractor), embedder, index, chunking, batch_size)
    }

    pub fn with_extractor(
        extractor: Box<dyn PdfExtractor + Send + Sync>,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            chunking,
            batch_size,
        }
    }

    /// Extracts, chunks, embeds and indexes one document.
    ///
    /// The document's entries are committed to the index in a single step only
    /// after every stage succeeded; on failure the index is left unchanged and
    /// the document is marked failed. Retrying a document id replaces its
    /// previous entries instead of duplicating them.
    pub fn ingest(&self, document: &mut Document, content: impl Read) -> Result<IndexReport, IngestError> {
        document.begin_processing()?;
        info!(document_id = %document.id, name = %document.name, "ingesting document");

        match self.run(document, content) {
            Ok(report) => {
                document.complete(report.chunks_indexed);
                info!(
                    document_id = %report.document_id,
                    chunks = report.chunks_indexed,
                    pages = report.pages,
                    empty_pages = report.empty_pages,
                    "document indexed"
                );
                Ok(report)
            }
            Err(error) => {
                warn!(document_id = %document.id, error = %error, "ingestion failed");
                document.fail(error.to_string());
                Err(error)
            }
        }
    }

    pub fn remove(&self, document_id: &str) -> usize {
        let removed = self.index.remove_document(document_id);
        info!(document_id, removed, "removed document from index");
        removed
    }

    fn run(&self, document: &mut Document, content: impl Read) -> Result<IndexReport, IngestError> {
        let bytes = read_pdf(content)?;
        document.checksum = Some(digest_bytes(&bytes));

        let pages = self.extractor.extract_pages(&bytes)?;
        let empty_pages = pages.iter().filter(|page| page.is_blank()).count();

        let units = chunk_pages(document, &pages, &self.chunking)?;
        let texts = units.iter().map(|unit| unit.text.as_str()).collect::<Vec<_>>();
        let vectors = embed_in_batches(self.embedder.as_ref(), &texts, self.batch_size)?;

        let model_id = self.embedder.model_id().to_string();
        let staged = units
            .into_iter()
            .zip(vectors)
            .map(|(unit, vector)| StagedEntry {
                unit,
                embedding: Embedding {
                    model_id: model_id.clone(),
                    vector,
                },
            })
            .collect::<Vec<_>>();

        let ids = self.index.replace_document(&document.id, staged)?;

        Ok(IndexReport {
            document_id: document.id.clone(),
            chunks_indexed: ids.len(),
            status: DocumentStatus::Completed,
            pages: pages.len(),
            empty_pages,
            generation: document.generation,
            completed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{EmbeddingError, ExtractionError};
    use crate::extractor::PageText;
    use crate::index::IndexConfig;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    /// Treats the byte stream as UTF-8 text with pages separated by form feeds.
    pub(crate) struct FormFeedExtractor {
        pub(crate) first_page: u32,
    }

    impl PdfExtractor for FormFeedExtractor {
        fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
            let text = std::str::from_utf8(bytes)
                .map_err(|error| ExtractionError::Unreadable(error.to_string()))?;
            if text.is_empty() {
                return Err(ExtractionError::Unreadable("empty".to_string()));
            }
            Ok(text
                .split('\u{000c}')
                .enumerate()
                .map(|(index, page)| PageText::new(self.first_page + index as u32, page))
                .collect())
        }
    }

    /// Counts query-vocabulary words; keeps similarity scores predictable.
    pub(crate) struct VocabularyEmbedder;

    pub(crate) const VOCABULARY: [&str; 6] =
        ["penalty", "trespass", "contract", "lease", "tenant", "fine"];

    impl Embedder for VocabularyEmbedder {
        fn model_id(&self) -> &str {
            "vocabulary"
        }

        fn dimensions(&self) -> usize {
            VOCABULARY.len() + 1
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lowered = text.to_lowercase();
                    let mut vector = VOCABULARY
                        .iter()
                        .map(|word| lowered.matches(word).count() as f32)
                        .collect::<Vec<_>>();
                    // Bias term so text without vocabulary words is not a zero vector.
                    vector.push(0.1);
                    vector
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn model_id(&self) -> &str {
            "vocabulary"
        }

        fn dimensions(&self) -> usize {
            VOCABULARY.len() + 1
        }

        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::ModelUnavailable("model is loading".to_string()))
        }
    }

    pub(crate) fn vocabulary_index() -> Arc<VectorIndex> {
        Arc::new(VectorIndex::new(IndexConfig {
            dimensions: VOCABULARY.len() + 1,
            model_id: "vocabulary".to_string(),
            path: None,
        }))
    }

    pub(crate) fn small_chunks() -> ChunkingConfig {
        ChunkingConfig {
            unit_chars: 160,
            overlap_chars: 30,
            sentence_margin_chars: 60,
            ..ChunkingConfig::default()
        }
    }

    fn pipeline(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> IngestionPipeline {
        IngestionPipeline::with_extractor(
            Box::new(FormFeedExtractor { first_page: 1 }),
            embedder,
            index,
            small_chunks(),
            4,
        )
    }

    const LEASE_TEXT: &str = "Article 1 Leases\nA lease binds the tenant to pay rent monthly. The tenant must give notice before leaving. A lease ends at the agreed date.\u{000c}\u{000c}Article 2 Deposits\nThe tenant pays a deposit. The deposit is returned when the lease ends without damage to the property.";

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn document_ids_are_stable_per_path() {
        let first = document_id_for_path(Path::new("/corpus/act.pdf"));
        let second = document_id_for_path(Path::new("/corpus/act.pdf"));
        assert_eq!(first, second);
        assert_ne!(first, document_id_for_path(Path::new("/corpus/other.pdf")));
    }

    #[test]
    fn report_counts_every_unit_and_blank_page() {
        let index = vocabulary_index();
        let pipeline = pipeline(Arc::new(VocabularyEmbedder), Arc::clone(&index));
        let mut document = Document::with_id("lease-act", "Lease Act.pdf");

        let units = chunk_pages(
            &document,
            &FormFeedExtractor { first_page: 1 }
                .extract_pages(LEASE_TEXT.as_bytes())
                .expect("pages"),
            &small_chunks(),
        )
        .expect("units");
        let report = pipeline
            .ingest(&mut document, LEASE_TEXT.as_bytes())
            .expect("ingestion succeeds");

        assert_eq!(report.chunks_indexed, units.len());
        assert_eq!(report.pages, 3);
        assert_eq!(report.empty_pages, 1);
        assert_eq!(index.len(), units.len());
        assert_eq!(document.status, DocumentStatus::Completed);
        assert_eq!(document.chunks_indexed, units.len());
        assert_eq!(document.checksum.as_deref(), Some(digest_bytes(LEASE_TEXT.as_bytes()).as_str()));
    }

    #[test]
    fn reingesting_is_idempotent_and_deterministic() {
        let index = vocabulary_index();
        let pipeline = pipeline(Arc::new(VocabularyEmbedder), Arc::clone(&index));
        let mut document = Document::with_id("lease-act", "Lease Act.pdf");

        pipeline
            .ingest(&mut document, LEASE_TEXT.as_bytes())
            .expect("first ingestion");
        let query = VocabularyEmbedder.embed("lease tenant").expect("query vector");
        let before = index.search(&query, 50).expect("search");

        document.reingest();
        let report = pipeline
            .ingest(&mut document, LEASE_TEXT.as_bytes())
            .expect("second ingestion");
        let after = index.search(&query, 50).expect("search");

        assert_eq!(report.generation, 1);
        assert_eq!(index.len(), before.len());
        let ids = |hits: &[crate::index::SearchHit]| {
            hits.iter()
                .map(|hit| (hit.unit.unit_id.clone(), hit.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&before), ids(&after));
    }

    #[test]
    fn failed_ingestion_leaves_index_unchanged() {
        let index = vocabulary_index();
        let good = pipeline(Arc::new(VocabularyEmbedder), Arc::clone(&index));
        let mut first = Document::with_id("first", "First.pdf");
        good.ingest(&mut first, LEASE_TEXT.as_bytes()).expect("seed");
        let count = index.len();

        let failing = pipeline(Arc::new(FailingEmbedder), Arc::clone(&index));
        let mut second = Document::with_id("second", "Second.pdf");
        let error = failing
            .ingest(&mut second, LEASE_TEXT.as_bytes())
            .expect_err("embedding fails");

        assert!(error.is_transient());
        assert_eq!(index.len(), count);
        assert!(!index.contains_document("second"));
        assert_eq!(second.status, DocumentStatus::Failed);
        assert!(second.error_message.is_some());
    }

    #[test]
    fn unreadable_input_fails_the_document() {
        let index = vocabulary_index();
        let pipeline = pipeline(Arc::new(VocabularyEmbedder), Arc::clone(&index));
        let mut document = Document::with_id("empty", "Empty.pdf");

        let error = pipeline
            .ingest(&mut document, std::io::empty())
            .expect_err("empty input fails");
        assert!(matches!(error, IngestError::Extraction(_)));
        assert!(!error.is_transient());
        assert_eq!(document.status, DocumentStatus::Failed);
        assert!(index.is_empty());
    }

    #[test]
    fn removal_drops_only_that_document() {
        let index = vocabulary_index();
        let pipeline = pipeline(Arc::new(VocabularyEmbedder), Arc::clone(&index));
        let mut lease = Document::with_id("lease", "Lease.pdf");
        let mut other = Document::with_id("other", "Other.pdf");
        pipeline.ingest(&mut lease, LEASE_TEXT.as_bytes()).expect("lease");
        let other_report = pipeline
            .ingest(&mut other, "Part 9 Contracts\nA contract needs an offer.".as_bytes())
            .expect("other");

        pipeline.remove("lease");
        assert_eq!(index.len(), other_report.chunks_indexed);
        let hits = index
            .search(&VocabularyEmbedder.embed("lease").expect("vector"), 10)
            .expect("search");
        assert!(hits.iter().all(|hit| hit.unit.document_id == "other"));
    }

    #[test]
    fn concurrent_ingestion_indexes_both_documents() {
        let index = vocabulary_index();
        let pipeline = Arc::new(pipeline(Arc::new(VocabularyEmbedder), Arc::clone(&index)));
        let contract_text = "Part 3 Contracts\nA contract requires an offer and acceptance. Breach of contract leads to damages. A penalty clause in a contract is void when excessive.";

        let reports = std::thread::scope(|scope| {
            let lease = {
                let pipeline = Arc::clone(&pipeline);
                scope.spawn(move || {
                    let mut document = Document::with_id("lease", "Lease.pdf");
                    pipeline.ingest(&mut document, LEASE_TEXT.as_bytes())
                })
            };
            let contract = {
                let pipeline = Arc::clone(&pipeline);
                scope.spawn(move || {
                    let mut document = Document::with_id("contract", "Contract.pdf");
                    pipeline.ingest(&mut document, contract_text.as_bytes())
                })
            };
            [lease.join(), contract.join()]
        });

        let mut total = 0;
        for report in reports {
            let report = report.expect("thread finished").expect("ingestion succeeds");
            total += report.chunks_indexed;
        }
        assert_eq!(index.len(), total);
        assert!(index.contains_document("lease"));
        assert!(index.contains_document("contract"));
    }
}
