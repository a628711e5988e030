//! Confidence scoring for synthesized answers.
//!
//! The score is a weighted sum of three signals, each in `[0, 1]`:
//!
//! - `top`: similarity of the best qualifying unit,
//! - `coverage`: how many units cleared the similarity threshold,
//!   saturating at `saturation`,
//! - `agreement`: how many distinct (document, page) locations the answer
//!   actually cites, saturating at `saturation`.
//!
//! An answer that cites nothing is capped at `uncited_ceiling`; a query with no
//! qualifying units scores exactly `floor`. The weights are configuration.

use crate::models::Citation;
use crate::retriever::RetrievedUnit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub top_weight: f32,
    pub coverage_weight: f32,
    pub agreement_weight: f32,
    pub saturation: usize,
    pub uncited_ceiling: f32,
    pub floor: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            top_weight: 0.6,
            coverage_weight: 0.25,
            agreement_weight: 0.15,
            saturation: 3,
            uncited_ceiling: 0.2,
            floor: 0.0,
        }
    }
}

impl ConfidenceConfig {
    pub fn score(&self, qualifying: &[RetrievedUnit], citations: &[Citation]) -> f32 {
        if qualifying.is_empty() {
            return self.floor.clamp(0.0, 1.0);
        }

        let saturation = self.saturation.max(1) as f32;
        let top = qualifying
            .iter()
            .map(|unit| unit.score)
            .fold(f32::MIN, f32::max)
            .clamp(0.0, 1.0);
        let coverage = (qualifying.len() as f32).min(saturation) / saturation;
        let locations = citations
            .iter()
            .map(|citation| (citation.document_id.as_str(), citation.page))
            .collect::<HashSet<_>>()
            .len();
        let agreement = (locations as f32).min(saturation) / saturation;

        let score = self.top_weight * top
            + self.coverage_weight * coverage
            + self.agreement_weight * agreement;
        let score = if citations.is_empty() {
            score.min(self.uncited_ceiling)
        } else {
            score
        };
        score.clamp(self.floor.clamp(0.0, 1.0), 1.0)
    }
}
