use crate::error::ExtractionError;
use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{debug, warn};

/// Text of a single PDF page. `number` is 1-indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub trait PdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::Unreadable("pdf stream is empty".to_string()));
        }

        let document = Document::load_mem(bytes)
            .map_err(|error| ExtractionError::Unreadable(error.to_string()))?;

        if document.is_encrypted() {
            return Err(ExtractionError::Encrypted);
        }

        let page_numbers = document.get_pages().into_keys().collect::<Vec<_>>();
        if page_numbers.is_empty() {
            return Err(ExtractionError::Unreadable("pdf has no pages".to_string()));
        }

        let pages = page_numbers
            .into_iter()
            .map(|page_no| match document.extract_text(&[page_no]) {
                Ok(text) => PageText::new(page_no, text),
                Err(error) => {
                    // Scanned or oddly encoded pages keep their slot so numbering holds.
                    warn!(page = page_no, error = %error, "page text could not be extracted");
                    PageText::new(page_no, String::new())
                }
            })
            .collect::<Vec<_>>();

        debug!(
            pages = pages.len(),
            blank = pages.iter().filter(|page| page.is_blank()).count(),
            "extracted pdf pages"
        );

        Ok(pages)
    }
}

/// Reads a whole PDF stream from the blob store handle.
pub fn read_pdf(mut reader: impl Read) -> Result<Vec<u8>, ExtractionError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(bytes)
}

pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
    LopdfExtractor.extract_pages(bytes)
}
