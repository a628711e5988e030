//! In-process vector index over unit embeddings.
//!
//! Entries are L2-normalized when added, so similarity is a plain dot product
//! (cosine similarity). Structural mutations (`add`, `replace_document`,
//! `remove_document`, `persist`) are serialized through a writer mutex, while
//! searches only take the read side of the state lock. A mutation prepares its
//! entries before it takes the write lock, so a concurrent search observes
//! either the state before or the state after it.

use crate::error::IndexError;
use crate::models::{Embedding, Unit};
use crate::persistence;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    pub dimensions: usize,
    pub model_id: String,
    pub path: Option<PathBuf>,
}

/// A unit and its embedding, ready to be committed.
#[derive(Debug, Clone)]
pub struct StagedEntry {
    pub unit: Unit,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: u64,
    pub unit: Unit,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entry_id: u64,
    pub unit: Unit,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub entries: usize,
    pub documents: usize,
    pub dimensions: usize,
}

#[derive(Debug, Default)]
pub(crate) struct IndexState {
    pub(crate) entries: Vec<IndexEntry>,
    pub(crate) next_id: u64,
}

pub struct VectorIndex {
    config: IndexConfig,
    state: RwLock<IndexState>,
    writer: Mutex<()>,
}

impl VectorIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self::from_state(config, IndexState::default())
    }

    pub(crate) fn from_state(config: IndexConfig, state: IndexState) -> Self {
        Self {
            config,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        }
    }

    /// Loads a persisted index, checking it against `config`.
    pub fn load(config: IndexConfig) -> Result<Self, IndexError> {
        let path = config.path.clone().ok_or(IndexError::NotPersistent)?;
        let state = persistence::read_snapshot(&path, &config)?;
        info!(path = %path.display(), entries = state.entries.len(), "loaded vector index");
        Ok(Self::from_state(config, state))
    }

    /// Loads the index when its file exists, otherwise starts empty.
    pub fn open(config: IndexConfig) -> Result<Self, IndexError> {
        match &config.path {
            Some(path) if path.exists() => Self::load(config),
            _ => Ok(Self::new(config)),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn add(&self, entries: Vec<StagedEntry>) -> Result<Vec<u64>, IndexError> {
        let prepared = self.prepare(entries)?;
        let _writer = self.lock_writer();
        let mut state = self.write_state();
        let ids = commit(&mut state, prepared);
        debug!(added = ids.len(), total = state.entries.len(), "added index entries");
        Ok(ids)
    }

    /// Replaces every entry of `document_id` with `entries` in one step.
    pub fn replace_document(
        &self,
        document_id: &str,
        entries: Vec<StagedEntry>,
    ) -> Result<Vec<u64>, IndexError> {
        if let Some(foreign) = entries
            .iter()
            .find(|entry| entry.unit.document_id != document_id)
        {
            return Err(IndexError::Corruption(format!(
                "unit {} belongs to {}, not {}",
                foreign.unit.unit_id, foreign.unit.document_id, document_id
            )));
        }

        let prepared = self.prepare(entries)?;
        let _writer = self.lock_writer();
        let mut state = self.write_state();
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| entry.unit.document_id != document_id);
        let removed = before - state.entries.len();
        let ids = commit(&mut state, prepared);
        debug!(
            document_id,
            removed,
            added = ids.len(),
            "replaced document entries"
        );
        Ok(ids)
    }

    pub fn remove_document(&self, document_id: &str) -> usize {
        let _writer = self.lock_writer();
        let mut state = self.write_state();
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| entry.unit.document_id != document_id);
        let removed = before - state.entries.len();
        debug!(document_id, removed, "removed document entries");
        removed
    }

    /// Top-`k` entries by cosine similarity. Fails on an empty index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.search_with(query, k, true)
    }

    /// Like [`VectorIndex::search`]; with `strict == false` an empty index
    /// yields an empty result instead of [`IndexError::EmptyIndex`].
    pub fn search_with(
        &self,
        query: &[f32],
        k: usize,
        strict: bool,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dimensions(query.len())?;
        let query = normalized(query);

        let state = self.read_state();
        if state.entries.is_empty() {
            return if strict {
                Err(IndexError::EmptyIndex)
            } else {
                Ok(Vec::new())
            };
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored = state
            .entries
            .iter()
            .map(|entry| (dot(&query, &entry.vector), entry))
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| {
            right
                .0
                .total_cmp(&left.0)
                .then_with(|| left.1.id.cmp(&right.1.id))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| SearchHit {
                entry_id: entry.id,
                unit: entry.unit.clone(),
                score,
            })
            .collect())
    }

    pub fn persist(&self) -> Result<(), IndexError> {
        let path = self.config.path.clone().ok_or(IndexError::NotPersistent)?;
        let _writer = self.lock_writer();
        let state = self.read_state();
        persistence::write_snapshot(&path, &self.config, &state)?;
        info!(path = %path.display(), entries = state.entries.len(), "persisted vector index");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.read_state()
            .entries
            .iter()
            .any(|entry| entry.unit.document_id == document_id)
    }

    pub fn document_count(&self) -> usize {
        self.read_state()
            .entries
            .iter()
            .map(|entry| entry.unit.document_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.len(),
            documents: self.document_count(),
            dimensions: self.config.dimensions,
        }
    }

    fn prepare(&self, entries: Vec<StagedEntry>) -> Result<Vec<(Unit, Vec<f32>)>, IndexError> {
        for entry in &entries {
            self.check_dimensions(entry.embedding.vector.len())?;
            if entry.embedding.model_id != self.config.model_id {
                return Err(IndexError::ModelMismatch {
                    expected: self.config.model_id.clone(),
                    actual: entry.embedding.model_id.clone(),
                });
            }
        }

        Ok(entries
            .into_iter()
            .map(|entry| {
                let vector = normalized(&entry.embedding.vector);
                (entry.unit, vector)
            })
            .collect())
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.config.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimensions,
                actual,
            });
        }
        Ok(())
    }

    // A panic while holding a lock cannot leave a half-written entry behind,
    // so poisoned locks are recovered.
    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn commit(state: &mut IndexState, prepared: Vec<(Unit, Vec<f32>)>) -> Vec<u64> {
    let mut ids = Vec::with_capacity(prepared.len());
    for (unit, vector) in prepared {
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(IndexEntry { id, unit, vector });
        ids.push(id);
    }
    ids
}

pub(crate) fn normalized(vector: &[f32]) -> Vec<f32> {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vector.iter().map(|value| value / magnitude).collect()
    } else {
        vector.to_vec()
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}
