use crate::error::SynthesisError;
use crate::traits::LanguageModel;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const INSTRUCTIONS: &str = "You are a legal research assistant. Answer the question using only the \
numbered passages below. Support every statement with the passage number in square brackets, \
for example [1] or [2]. Never cite a number that is not listed. If the passages do not answer the \
question, say so.";

/// A passage the model may cite, numbered from 1 in rank order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub marker: usize,
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    pub passages: Vec<Passage>,
}

impl GenerationRequest {
    pub fn render_prompt(&self) -> String {
        let context = self
            .passages
            .iter()
            .map(|passage| format!("[{}] {}\n{}", passage.marker, passage.label, passage.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "{INSTRUCTIONS}\n\nPassages:\n{context}\n\nQuestion: {}\nAnswer:",
            self.query
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorProvider {
    Extractive,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub provider: GeneratorProvider,
    pub model: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_sentences: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorProvider::Extractive,
            model: None,
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 120,
            temperature: 0.0,
            max_sentences: 3,
        }
    }
}

pub fn create_generator(config: &GeneratorConfig) -> Result<Arc<dyn LanguageModel>, SynthesisError> {
    match config.provider {
        GeneratorProvider::Extractive => Ok(Arc::new(ExtractiveGenerator::new(config.max_sentences))),
        GeneratorProvider::Ollama => {
            let model = config.model.clone().ok_or_else(|| {
                SynthesisError::Generation("generator.model is required for ollama".to_string())
            })?;
            Ok(Arc::new(OllamaGenerator::new(
                &config.base_url,
                model,
                config.temperature,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

/// Generator backed by an Ollama server's non-streaming `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    endpoint: Url,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, SynthesisError> {
        Ok(Self {
            endpoint: Url::parse(base_url)?.join("api/generate")?,
            model: model.into(),
            temperature,
            timeout,
        })
    }
}

impl LanguageModel for OllamaGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, SynthesisError> {
        let client = Client::builder().timeout(self.timeout).build()?;
        let response = client
            .post(self.endpoint.clone())
            .json(&OllamaGenerateRequest {
                model: &self.model,
                prompt: request.render_prompt(),
                stream: false,
                options: OllamaOptions {
                    temperature: self.temperature,
                },
            })
            .send()
            .map_err(|error| SynthesisError::Generation(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SynthesisError::Generation(format!(
                "generate request to {} returned {status}: {body}",
                self.endpoint
            )));
        }

        let payload: OllamaGenerateResponse = response
            .json()
            .map_err(|error| SynthesisError::Generation(error.to_string()))?;
        debug!(model = %self.model, chars = payload.response.len(), "generated answer");
        Ok(payload.response)
    }
}

/// Offline generator: quotes the sentence of each passage that shares the most
/// terms with the query and cites it. Deterministic.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl ExtractiveGenerator {
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl LanguageModel for ExtractiveGenerator {
    fn model_id(&self) -> &str {
        "extractive"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, SynthesisError> {
        let terms = query_terms(&request.query);

        let mut picked = request
            .passages
            .iter()
            .filter_map(|passage| {
                split_sentences(&passage.text)
                    .into_iter()
                    .map(|sentence| (term_overlap(sentence, &terms), sentence))
                    .filter(|(overlap, _)| *overlap > 0)
                    .max_by(|left, right| left.0.cmp(&right.0).then_with(|| right.1.len().cmp(&left.1.len())))
                    .map(|(overlap, sentence)| (overlap, passage.marker, sentence.to_string()))
            })
            .collect::<Vec<_>>();

        // Best overlap first; rank order (marker) breaks ties.
        picked.sort_by(|left, right| right.0.cmp(&left.0).then_with(|| left.1.cmp(&right.1)));

        let mut seen = HashSet::new();
        let answer = picked
            .into_iter()
            .filter(|(_, _, sentence)| seen.insert(sentence.to_lowercase()))
            .take(self.max_sentences)
            .map(|(_, marker, sentence)| format!("{sentence} [{marker}]"))
            .collect::<Vec<_>>()
            .join(" ");

        if answer.is_empty() {
            return Ok("The supplied passages do not directly address the question.".to_string());
        }
        Ok(answer)
    }
}

fn query_terms(query: &str) -> HashSet<String> {
    tokens(query)
        .filter(|token| token.chars().count() > 2 && !is_stopword(token))
        .collect()
}

fn term_overlap(sentence: &str, terms: &HashSet<String>) -> usize {
    tokens(sentence)
        .collect::<HashSet<_>>()
        .intersection(terms)
        .count()
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

fn is_stopword(token: &str) -> bool {
    matches!(
        token,
        "the" | "and" | "for" | "what" | "which" | "who" | "whom" | "does" | "are" | "was"
            | "were" | "under" | "with" | "from" | "that" | "this" | "there" | "how" | "any"
    )
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (index, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | ';' | '\n') {
            let end = index + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}
