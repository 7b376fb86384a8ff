//! Memory store configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the log, index and id map
    pub memory_dir: PathBuf,

    /// Memory log file (relative paths resolve inside `memory_dir`)
    pub log_file: PathBuf,

    /// Persisted index blob, inside `memory_dir`
    pub index_file: String,

    /// Persisted id map, inside `memory_dir`
    pub id_map_file: String,

    /// Number of memories retrieved when the caller does not say
    pub default_top_k: usize,

    /// Sync each log append to disk before returning
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            memory_dir: PathBuf::from("memory"),
            log_file: PathBuf::from("ghost_soul_file.jsonl"),
            index_file: "soul_index.bin".to_string(),
            id_map_file: "soul_id_map.json".to_string(),
            default_top_k: 5,
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration rooted at a memory directory
    pub fn new<P: Into<PathBuf>>(memory_dir: P) -> Self {
        Self {
            memory_dir: memory_dir.into(),
            ..Default::default()
        }
    }

    /// Create config for testing with temporary directory
    pub fn for_testing(path: &Path) -> Self {
        Self {
            memory_dir: path.to_path_buf(),
            sync_writes: false,
            ..Default::default()
        }
    }

    /// Builder: set the log file
    pub fn log_file<P: Into<PathBuf>>(mut self, log_file: P) -> Self {
        self.log_file = log_file.into();
        self
    }

    /// Builder: set the default number of retrieved memories
    pub fn default_top_k(mut self, k: usize) -> Self {
        self.default_top_k = k;
        self
    }

    /// Builder: set durable appends
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Resolved path of the memory log
    pub fn log_path(&self) -> PathBuf {
        if self.log_file.is_absolute() {
            self.log_file.clone()
        } else {
            self.memory_dir.join(&self.log_file)
        }
    }

    /// Resolved path of the index blob
    pub fn index_path(&self) -> PathBuf {
        self.memory_dir.join(&self.index_file)
    }

    /// Resolved path of the id map
    pub fn id_map_path(&self) -> PathBuf {
        self.memory_dir.join(&self.id_map_file)
    }
}
