//! In-memory embedding store backed by a JSON snapshot file.

use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Snapshot row: a content chunk plus its embedding vector.
///
/// The serialized shape (`url`, `title`, `text`, `embedding`) is shared by
/// the offline embedding job that writes the snapshot and the runtime store
/// that reads it, and must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    /// Source page URL.
    pub url: String,
    /// Source page title.
    pub title: String,
    /// Chunk text submitted to the embedding model.
    pub text: String,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
}

/// One ranked search hit, borrowed from the store.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalResult<'a> {
    /// Matched chunk.
    pub chunk: &'a EmbeddedChunk,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Errors surfaced while loading a snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The snapshot file could not be read.
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The snapshot file was not a valid chunk array.
    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The snapshot mixed embedding vectors of different lengths.
    #[error("snapshot {path} mixes embedding dimensions {expected} and {found}")]
    DimensionMismatch {
        /// Snapshot location.
        path: PathBuf,
        /// Dimension of the first vector.
        expected: usize,
        /// First conflicting dimension encountered.
        found: usize,
    },
}

/// Cosine similarity between two vectors, defined as 0.0 (rather than NaN)
/// when either vector has zero magnitude, so that ranking stays total.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Read-only set of embedded chunks with linear-scan similarity search.
///
/// The dataset is bounded to one site's chunked content, so a full scan per
/// query beats maintaining an approximate index.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    chunks: Vec<EmbeddedChunk>,
}

impl EmbeddingStore {
    /// Builds a store from already-loaded chunks (used by tests and by the
    /// snapshot loader).
    pub fn new(chunks: Vec<EmbeddedChunk>) -> Self {
        Self { chunks }
    }

    /// Reads a snapshot file: a single JSON array of embedded chunks.
    ///
    /// Fails fast when the file is unreadable, is not a chunk array, or
    /// mixes embedding dimensions.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let chunks: Vec<EmbeddedChunk> =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(first) = chunks.first() {
            let expected = first.embedding.len();
            if let Some(odd) = chunks.iter().find(|c| c.embedding.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    path: path.to_path_buf(),
                    expected,
                    found: odd.embedding.len(),
                });
            }
        }

        Ok(Self::new(chunks))
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// All stored chunks in snapshot order.
    pub fn chunks(&self) -> &[EmbeddedChunk] {
        &self.chunks
    }

    /// Returns the top `k` chunks by descending cosine similarity against
    /// `query`. Ties keep snapshot order (stable sort); at most
    /// `min(k, len)` results are returned.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievalResult<'_>> {
        let mut results: Vec<RetrievalResult<'_>> = self
            .chunks
            .iter()
            .map(|chunk| RetrievalResult {
                chunk,
                score: cosine_similarity(query, &chunk.embedding),
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(k);
        results
    }
}

/// Snapshot-backed store that loads at most once per process.
///
/// The first `get` reads the snapshot; every later call returns the same
/// in-memory set. A failed load is logged and degrades to an empty store so
/// retrieval falls back to no-context answers instead of crashing. Tests
/// construct it with [`LazyStore::preloaded`] instead of a file.
pub struct LazyStore {
    path: PathBuf,
    cell: OnceLock<EmbeddingStore>,
}

impl LazyStore {
    /// Creates a lazy handle for a snapshot path without reading it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cell: OnceLock::new(),
        }
    }

    /// Creates an already-initialized handle around an in-memory store.
    pub fn preloaded(store: EmbeddingStore) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(store);
        Self {
            path: PathBuf::new(),
            cell,
        }
    }

    /// Returns the store, loading the snapshot on first use.
    pub fn get(&self) -> &EmbeddingStore {
        self.cell.get_or_init(|| match EmbeddingStore::load(&self.path) {
            Ok(store) => {
                info!(
                    chunks = store.len(),
                    path = %self.path.display(),
                    "loaded embedding snapshot"
                );
                store
            }
            Err(err) => {
                warn!(
                    error = %err,
                    "failed to load embedding snapshot; continuing with an empty store"
                );
                EmbeddingStore::default()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            text: text.to_string(),
            embedding,
        }
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = [0.3f32, -1.2, 4.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_opposite_vectors_is_minus_one() {
        let v = [1.0f32, 2.0, -3.0];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        let zero = [0.0f32; 3];
        let v = [1.0f32, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
    }

    #[test]
    fn search_orders_by_descending_score() {
        let store = EmbeddingStore::new(vec![
            chunk("a", vec![1.0, 0.0]),
            chunk("b", vec![0.0, 1.0]),
            chunk("c", vec![0.7, 0.7]),
        ]);
        let results = store.search(&[0.0, 1.0], 3);
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].chunk.text, "b");
    }

    #[test]
    fn search_caps_results_at_store_size() {
        let store = EmbeddingStore::new(vec![chunk("only", vec![1.0, 0.0])]);
        assert_eq!(store.search(&[1.0, 0.0], 10).len(), 1);
    }

    #[test]
    fn search_breaks_ties_by_store_order() {
        let store = EmbeddingStore::new(vec![
            chunk("first", vec![1.0, 0.0]),
            chunk("second", vec![2.0, 0.0]),
        ]);
        let results = store.search(&[1.0, 0.0], 2);
        assert_eq!(results[0].chunk.text, "first");
        assert_eq!(results[1].chunk.text, "second");
    }

    #[test]
    fn lazy_store_degrades_to_empty_on_missing_file() {
        let store = LazyStore::new("/nonexistent/snapshot.json");
        assert!(store.get().is_empty());
        // Second call returns the same cached (empty) store.
        assert!(store.get().is_empty());
    }

    #[test]
    fn preloaded_store_skips_the_filesystem() {
        let store = LazyStore::preloaded(EmbeddingStore::new(vec![chunk("x", vec![1.0])]));
        assert_eq!(store.get().len(), 1);
    }
}
