//! Query-time retrieval: embed, rank, and assemble context text.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::embedder::{EmbedError, Embedder};
use crate::store::LazyStore;

/// Default number of chunks assembled into the context window.
pub const DEFAULT_TOP_K: usize = 5;

/// Errors surfaced by retrieval. An empty store is not an error; only the
/// query-embedding call can fail here.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Embedding the query failed.
    #[error("query embedding failed: {0}")]
    Embed(#[from] EmbedError),
}

/// Pure retrieval boundary: embeds a query, ranks stored chunks, and joins
/// the top hits into context text. Performs no generation.
pub struct Retriever<E> {
    store: Arc<LazyStore>,
    embedder: E,
    top_k: usize,
}

impl<E: Embedder> Retriever<E> {
    /// Builds a retriever over a shared store and an embedding collaborator.
    pub fn new(store: Arc<LazyStore>, embedder: E) -> Self {
        Self {
            store,
            embedder,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Overrides the number of chunks joined into the context.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Returns context text for `query`: the texts of the highest-similarity
    /// chunks, best first, separated by blank lines.
    ///
    /// An empty store yields empty context without an embedding call, so
    /// callers degrade to answering from the bare query.
    pub fn retrieve(&self, query: &str) -> Result<String, RetrieveError> {
        let store = self.store.get();
        if store.is_empty() {
            debug!("embedding store is empty; returning empty context");
            return Ok(String::new());
        }

        let query_vector = self.embedder.embed(query)?;
        let matches = store.search(&query_vector, self.top_k);
        if let Some(best) = matches.first() {
            debug!(
                matches = matches.len(),
                top_score = best.score,
                "ranked context chunks"
            );
        }

        Ok(matches
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
