//! Flat exact vector index
//!
//! This module implements an exact nearest neighbor index over
//! unit-normalized vectors, scored by inner product.
//!
//! # Positions
//!
//! Vectors are addressed by insertion position. The position assigned by
//! [`FlatIndex::insert`] is the size of the index before the insert, which
//! the memory store keeps equal to the ordinal of the matching log record.
//!
//! # Persistence
//!
//! [`FlatIndex::save`] writes a bincode blob that only [`FlatIndex::load`]
//! understands. A blob that cannot be decoded, or whose contents are
//! inconsistent, loads as [`IndexError::Corrupt`].

use crate::embeddings::dot_product;
use ghostmesh_core::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Dimension of the placeholder index built over an empty batch
pub const SENTINEL_DIMENSION: usize = 1;

/// Errors that can occur during index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Corrupt index: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

impl From<IndexError> for Error {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Corrupt(msg) => Error::IndexCorrupt(msg),
            IndexError::Io(e) => Error::Io(e),
            IndexError::SerializationError(msg) => Error::Serialization(msg),
            other => Error::Internal(other.to_string()),
        }
    }
}

/// A scored hit from [`FlatIndex::search`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Insertion position of the matched vector
    pub position: usize,

    /// Inner product with the query (higher is more similar)
    pub score: f32,
}

/// Exact inner-product index with contiguous storage
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major, `len() * dimension` values
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Create the placeholder index used for an empty store
    pub fn sentinel() -> Self {
        Self::new(SENTINEL_DIMENSION)
    }

    /// Build an index over a batch of vectors
    ///
    /// The dimension is taken from the first vector. An empty batch yields
    /// the 1-dimensional sentinel index.
    pub fn build(vectors: &[Vec<f32>]) -> IndexResult<Self> {
        let Some(first) = vectors.first() else {
            return Ok(Self::sentinel());
        };

        let mut index = Self::new(first.len());
        index.insert_batch(vectors)?;
        Ok(index)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get the vector stored at a position
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Check a batch against the dimension it would be inserted with
    fn validate(&self, vectors: &[Vec<f32>]) -> IndexResult<usize> {
        let Some(first) = vectors.first() else {
            return Ok(self.dimension);
        };

        // An empty index adopts the dimension of its first vector
        let dimension = if self.is_empty() {
            first.len()
        } else {
            self.dimension
        };

        if dimension == 0 {
            return Err(IndexError::InvalidVector(
                "vector has no components".to_string(),
            ));
        }

        for vector in vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    got: vector.len(),
                });
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(IndexError::InvalidVector(
                    "vector has non-finite components".to_string(),
                ));
            }
        }

        Ok(dimension)
    }

    /// Append one vector, returning its position
    pub fn insert(&mut self, vector: &[f32]) -> IndexResult<usize> {
        self.insert_batch(&[vector.to_vec()])
    }

    /// Append vectors in order, returning the position of the first
    ///
    /// Every vector is validated before any is inserted, so a rejected batch
    /// leaves the index unchanged.
    pub fn insert_batch(&mut self, vectors: &[Vec<f32>]) -> IndexResult<usize> {
        let position = self.len();
        let dimension = self.validate(vectors)?;

        self.dimension = dimension;
        self.data.reserve(vectors.len() * dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        Ok(position)
    }

    /// Search for the `k` vectors with the highest inner product
    ///
    /// Results are ordered by descending score, ties by ascending position.
    /// Returns fewer than `k` hits when the index is smaller than `k`, and
    /// nothing when it is empty.
    pub fn search(&self, query: &[f32], k: usize) -> IndexResult<Vec<SearchResult>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }

        if query.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::InvalidVector(
                "query has non-finite components".to_string(),
            ));
        }

        let mut results: Vec<SearchResult> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| SearchResult {
                position,
                score: dot_product(query, vector),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.position.cmp(&b.position))
        });
        results.truncate(k);

        Ok(results)
    }

    /// Serialize the index to bytes
    pub fn to_bytes(&self) -> IndexResult<Vec<u8>> {
        let data = SerializedFlatIndex {
            dimension: self.dimension,
            count: self.len(),
            data: self.data.clone(),
        };

        bincode::serialize(&data).map_err(|e| IndexError::SerializationError(e.to_string()))
    }

    /// Deserialize an index from bytes
    pub fn from_bytes(bytes: &[u8]) -> IndexResult<Self> {
        let data: SerializedFlatIndex =
            bincode::deserialize(bytes).map_err(|e| IndexError::Corrupt(e.to_string()))?;

        if data.dimension == 0 {
            return Err(IndexError::Corrupt("zero dimension".to_string()));
        }

        let expected = data.count.checked_mul(data.dimension).ok_or_else(|| {
            IndexError::Corrupt(format!(
                "{} vectors of dimension {} overflow",
                data.count, data.dimension
            ))
        })?;
        if data.data.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "expected {} values for {} vectors, found {}",
                expected,
                data.count,
                data.data.len()
            )));
        }

        Ok(Self {
            dimension: data.dimension,
            data: data.data,
        })
    }

    /// Write the index blob to a file, replacing it atomically
    pub fn save(&self, path: &Path) -> IndexResult<()> {
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    /// Read an index blob from a file
    pub fn load(path: &Path) -> IndexResult<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// Serializable version of FlatIndex
#[derive(Debug, Serialize, Deserialize)]
struct SerializedFlatIndex {
    dimension: usize,
    count: usize,
    data: Vec<f32>,
}

/// Write through a sibling temp file and rename over the target
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    {
        use std::io::Write;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::normalize_vector;
    use tempfile::TempDir;

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        normalize_vector(&mut v);
        v
    }

    fn create_test_vectors() -> Vec<Vec<f32>> {
        vec![
            unit(&[1.0, 0.0, 0.0]),
            unit(&[0.9, 0.1, 0.0]),
            unit(&[0.8, 0.2, 0.0]),
            unit(&[0.0, 1.0, 0.0]),
            unit(&[0.0, 0.9, 0.1]),
            unit(&[0.0, 0.0, 1.0]),
        ]
    }

    #[test]
    fn test_build_empty_is_sentinel() {
        let index = FlatIndex::build(&[]).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.dimension(), SENTINEL_DIMENSION);
    }

    #[test]
    fn test_build_takes_first_dimension() {
        let index = FlatIndex::build(&create_test_vectors()).unwrap();
        assert_eq!(index.len(), 6);
        assert_eq!(index.dimension(), 3);
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let result = FlatIndex::build(&[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_insert_returns_previous_size() {
        let mut index = FlatIndex::build(&create_test_vectors()).unwrap();
        let position = index.insert(&unit(&[0.5, 0.5, 0.0])).unwrap();
        assert_eq!(position, 6);
        assert_eq!(index.len(), 7);
        assert_eq!(index.get(6).unwrap(), unit(&[0.5, 0.5, 0.0]).as_slice());
    }

    #[test]
    fn test_sentinel_adopts_first_dimension() {
        let mut index = FlatIndex::sentinel();
        let position = index.insert(&unit(&[0.0, 1.0, 0.0, 0.0])).unwrap();
        assert_eq!(position, 0);
        assert_eq!(index.dimension(), 4);

        let result = index.insert(&[1.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_insert_batch_is_all_or_nothing() {
        let mut index = FlatIndex::build(&create_test_vectors()).unwrap();
        let result = index.insert_batch(&[unit(&[1.0, 1.0, 0.0]), vec![1.0]]);
        assert!(result.is_err());
        assert_eq!(index.len(), 6);

        let result = index.insert_batch(&[vec![f32::NAN, 0.0, 0.0]]);
        assert!(matches!(result, Err(IndexError::InvalidVector(_))));
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn test_insert_rejects_empty_vector() {
        let mut index = FlatIndex::sentinel();
        let result = index.insert(&[]);
        assert!(matches!(result, Err(IndexError::InvalidVector(_))));
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_basic() {
        let index = FlatIndex::build(&create_test_vectors()).unwrap();

        let results = index.search(&unit(&[1.0, 0.0, 0.0]), 3).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].position, 0);
        assert!((results[0].score - 1.0).abs() < 0.0001);
        assert_eq!(results[1].position, 1);
        assert_eq!(results[2].position, 2);
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[test]
    fn test_search_fewer_than_k() {
        let index = FlatIndex::build(&create_test_vectors()[..2]).unwrap();
        let results = index.search(&unit(&[0.0, 1.0, 0.0]), 10).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_empty() {
        let index = FlatIndex::sentinel();
        // Query dimension is irrelevant on an empty index
        let results = index.search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_k_zero() {
        let index = FlatIndex::build(&create_test_vectors()).unwrap();
        assert!(index.search(&unit(&[1.0, 0.0, 0.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = FlatIndex::build(&create_test_vectors()).unwrap();
        let result = index.search(&[1.0, 0.0], 2);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_search_rejects_non_finite_query() {
        let index = FlatIndex::build(&create_test_vectors()).unwrap();

        let result = index.search(&[f32::NAN, 0.0, 0.0], 2);
        assert!(matches!(result, Err(IndexError::InvalidVector(_))));

        let result = index.search(&[f32::INFINITY, 0.0, 0.0], 2);
        assert!(matches!(result, Err(IndexError::InvalidVector(_))));
    }

    #[test]
    fn test_search_overflowing_scores_do_not_panic() {
        let big = vec![f32::MAX, f32::MAX];
        let vectors = vec![big.clone(), vec![-f32::MAX, f32::MAX], vec![1.0, 0.0]];
        let index = FlatIndex::build(&vectors).unwrap();

        let results = index.search(&big, 3).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_search_ties_break_by_position() {
        let v = unit(&[0.0, 1.0]);
        let index = FlatIndex::build(&[unit(&[1.0, 0.0]), v.clone(), v.clone(), v]).unwrap();
        let results = index.search(&unit(&[0.0, 1.0]), 3).unwrap();
        let positions: Vec<usize> = results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn test_serialization() {
        let index = FlatIndex::build(&create_test_vectors()).unwrap();

        let bytes = index.to_bytes().unwrap();
        let restored = FlatIndex::from_bytes(&bytes).unwrap();

        assert_eq!(restored, index);
        let results = restored.search(&unit(&[1.0, 0.0, 0.0]), 3).unwrap();
        assert_eq!(results[0].position, 0);
    }

    #[test]
    fn test_from_bytes_garbage_is_corrupt() {
        let result = FlatIndex::from_bytes(b"definitely not an index");
        assert!(matches!(result, Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_from_bytes_inconsistent_is_corrupt() {
        let bad = SerializedFlatIndex {
            dimension: 3,
            count: 2,
            data: vec![1.0, 0.0, 0.0],
        };
        let bytes = bincode::serialize(&bad).unwrap();
        let result = FlatIndex::from_bytes(&bytes);
        assert!(matches!(result, Err(IndexError::Corrupt(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.index");

        let index = FlatIndex::build(&create_test_vectors()).unwrap();
        index.save(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_save_and_load_sentinel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.index");

        FlatIndex::sentinel().save(&path).unwrap();
        let loaded = FlatIndex::load(&path).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dimension(), SENTINEL_DIMENSION);
    }

    #[test]
    fn test_load_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = FlatIndex::load(&dir.path().join("absent.index"));
        assert!(matches!(result, Err(IndexError::Io(_))));
    }

    #[test]
    fn test_corrupt_converts_to_index_corrupt() {
        let err: Error = IndexError::Corrupt("truncated".to_string()).into();
        assert!(err.is_corruption());
    }
}
