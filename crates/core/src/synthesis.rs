use crate::confidence::ConfidenceConfig;
use crate::error::SynthesisError;
use crate::llm::{GenerationRequest, Passage};
use crate::models::{Citation, QueryResult};
use crate::retriever::RetrievedUnit;
use crate::traits::LanguageModel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

// Markers are one to three digits; a bracketed year such as "[2020]" is prose.
const CITATION_MARKER_REGEX: &str = r"\[(\d{1,3}(?:\s*,\s*\d{1,3})*)\]";

pub const NO_EVIDENCE_ANSWER: &str =
    "No passage in the indexed documents is similar enough to this question to answer it.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_context_chars: usize,
    pub confidence: ConfidenceConfig,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6_000,
            confidence: ConfidenceConfig::default(),
        }
    }
}

pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, config: SynthesisConfig) -> Self {
        Self { model, config }
    }

    pub fn synthesize(
        &self,
        query: &str,
        retrieved: &[RetrievedUnit],
    ) -> Result<QueryResult, SynthesisError> {
        let context = build_context(retrieved, self.config.max_context_chars);
        if context.is_empty() {
            return Ok(QueryResult {
                query: query.to_string(),
                answer: NO_EVIDENCE_ANSWER.to_string(),
                citations: Vec::new(),
                confidence: self.config.confidence.score(&[], &[]),
            });
        }

        let request = GenerationRequest {
            query: query.to_string(),
            passages: context
                .iter()
                .enumerate()
                .map(|(index, unit)| Passage {
                    marker: index + 1,
                    label: passage_label(unit),
                    text: unit.unit.text.clone(),
                })
                .collect(),
        };

        let answer = self.model.generate(&request)?.trim().to_string();
        if answer.is_empty() {
            return Err(SynthesisError::EmptyAnswer);
        }

        let markers = cited_markers(&answer, context.len())?;
        let citations = markers
            .iter()
            .map(|&marker| citation_for(marker, &context[marker - 1]))
            .collect::<Vec<_>>();
        if citations.is_empty() {
            warn!(model = self.model.model_id(), "answer cites no passage");
        }

        let confidence = self.config.confidence.score(retrieved, &citations);
        info!(
            model = self.model.model_id(),
            passages = context.len(),
            citations = citations.len(),
            confidence,
            "synthesized answer"
        );

        Ok(QueryResult {
            query: query.to_string(),
            answer,
            citations,
            confidence,
        })
    }
}

/// Highest-ranked units whose full text fits the budget. Units are never cut;
/// the first unit that does not fit ends the context.
pub fn build_context(retrieved: &[RetrievedUnit], max_chars: usize) -> Vec<&RetrievedUnit> {
    let mut used = 0usize;
    retrieved
        .iter()
        .take_while(|unit| {
            let size = unit.unit.text.chars().count();
            if used + size > max_chars {
                return false;
            }
            used += size;
            true
        })
        .collect()
}

fn passage_label(unit: &RetrievedUnit) -> String {
    let pages = if unit.unit.page_start == unit.unit.page_end {
        format!("page {}", unit.unit.page_start)
    } else {
        format!("pages {}-{}", unit.unit.page_start, unit.unit.page_end)
    };
    match &unit.unit.section {
        Some(section) => format!("({}, {section}, {pages})", unit.unit.document_name),
        None => format!("({}, {pages})", unit.unit.document_name),
    }
}

/// Passage numbers cited in `answer`, in order of first appearance.
pub fn cited_markers(answer: &str, supplied: usize) -> Result<Vec<usize>, SynthesisError> {
    let pattern = Regex::new(CITATION_MARKER_REGEX)?;
    let mut seen = HashSet::new();
    let mut markers = Vec::new();

    for capture in pattern.captures_iter(answer) {
        let Some(group) = capture.get(1) else {
            continue;
        };
        for raw in group.as_str().split(',') {
            let marker = raw.trim().parse::<usize>().unwrap_or(0);
            if marker == 0 || marker > supplied {
                return Err(SynthesisError::UnsupportedCitation { marker, supplied });
            }
            if seen.insert(marker) {
                markers.push(marker);
            }
        }
    }

    Ok(markers)
}

fn citation_for(marker: usize, unit: &RetrievedUnit) -> Citation {
    Citation {
        marker,
        unit_id: unit.unit.unit_id.clone(),
        document_id: unit.unit.document_id.clone(),
        document_name: unit.unit.document_name.clone(),
        section: unit.unit.section.clone(),
        page: unit.unit.page_start,
        page_end: unit.unit.page_end,
        score: unit.score,
    }
}
