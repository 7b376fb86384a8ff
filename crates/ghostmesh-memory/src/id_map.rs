//! Ordinals covered by the persisted index
//!
//! Stored as a JSON array of integers next to the index blob. Only its
//! length is consulted: it is the freshness token compared against the
//! length of the memory log.

use crate::vector_index::write_atomic;
use ghostmesh_core::{Error, Ordinal, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdMap(Vec<Ordinal>);

impl IdMap {
    /// The id map of an index covering log records `0..len`
    pub fn sequential(len: usize) -> Self {
        Self((0..len).map(Ordinal::new).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ordinals(&self) -> &[Ordinal] {
        &self.0
    }

    /// Check the freshness token against the current log length
    pub fn is_fresh_for(&self, log_len: usize) -> bool {
        self.len() == log_len
    }

    /// Read an id map; unparseable content is [`Error::IndexCorrupt`]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::IndexCorrupt(format!("id map {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        write_atomic(path, &bytes)?;
        Ok(())
    }
}
