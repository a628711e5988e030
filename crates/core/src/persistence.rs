use crate::error::IndexError;
use crate::index::{IndexConfig, IndexEntry, IndexState};
use crate::models::Unit;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    format_version: u32,
    dimensions: usize,
    model_id: String,
    entry_count: usize,
    next_id: u64,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    id: u64,
    unit: Unit,
    /// Little-endian f32 values, base64 encoded, so reloads are bit-exact.
    vector: String,
}

pub(crate) fn write_snapshot(
    path: &Path,
    config: &IndexConfig,
    state: &IndexState,
) -> Result<(), IndexError> {
    let snapshot = Snapshot {
        format_version: FORMAT_VERSION,
        dimensions: config.dimensions,
        model_id: config.model_id.clone(),
        entry_count: state.entries.len(),
        next_id: state.next_id,
        entries: state
            .entries
            .iter()
            .map(|entry| SnapshotEntry {
                id: entry.id,
                unit: entry.unit.clone(),
                vector: encode_vector(&entry.vector),
            })
            .collect(),
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        serde_json::to_writer(&mut file, &snapshot)?;
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

pub(crate) fn read_snapshot(path: &Path, config: &IndexConfig) -> Result<IndexState, IndexError> {
    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)
        .map_err(|error| IndexError::Corruption(format!("{}: {error}", path.display())))?;

    if snapshot.format_version != FORMAT_VERSION {
        return Err(IndexError::Corruption(format!(
            "unsupported index format version {}",
            snapshot.format_version
        )));
    }
    if snapshot.dimensions != config.dimensions {
        return Err(IndexError::Corruption(format!(
            "index dimension {} does not match configured dimension {}",
            snapshot.dimensions, config.dimensions
        )));
    }
    if snapshot.model_id != config.model_id {
        return Err(IndexError::Corruption(format!(
            "index model {} does not match configured model {}",
            snapshot.model_id, config.model_id
        )));
    }
    if snapshot.entry_count != snapshot.entries.len() {
        return Err(IndexError::Corruption(format!(
            "index declares {} entries but holds {}",
            snapshot.entry_count,
            snapshot.entries.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(snapshot.entries.len());
    for entry in snapshot.entries {
        if !seen.insert(entry.id) || entry.id >= snapshot.next_id {
            return Err(IndexError::Corruption(format!(
                "entry id {} is duplicated or out of range",
                entry.id
            )));
        }
        let vector = decode_vector(&entry.vector, config.dimensions)?;
        entries.push(IndexEntry {
            id: entry.id,
            unit: entry.unit,
            vector,
        });
    }
    entries.sort_by_key(|entry| entry.id);

    Ok(IndexState {
        entries,
        next_id: snapshot.next_id,
    })
}

fn encode_vector(vector: &[f32]) -> String {
    let bytes = vector
        .iter()
        .flat_map(|value| value.to_le_bytes())
        .collect::<Vec<u8>>();
    STANDARD.encode(bytes)
}

fn decode_vector(encoded: &str, dimensions: usize) -> Result<Vec<f32>, IndexError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|error| IndexError::Corruption(format!("vector is not base64: {error}")))?;
    if bytes.len() != dimensions * 4 {
        return Err(IndexError::Corruption(format!(
            "vector holds {} bytes, expected {}",
            bytes.len(),
            dimensions * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
