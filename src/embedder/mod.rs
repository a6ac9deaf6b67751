//! Embedding collaborators mapping text to fixed-length float vectors.

mod openai;

pub use openai::OpenAiEmbedder;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by embedding collaborators.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The client was constructed with unusable parameters.
    #[error("invalid embedder configuration: {0}")]
    Config(String),
    /// The transport failed or the response body could not be decoded.
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("embedding endpoint returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The endpoint returned a different number of vectors than inputs.
    #[error("embedding endpoint returned {got} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of inputs submitted.
        expected: usize,
        /// Number of vectors received.
        got: usize,
    },
    /// The response carried no vector at all.
    #[error("embedding response contained no vectors")]
    Empty,
    /// A batch exceeded the configured per-request cap.
    #[error("batch of {got} inputs exceeds configured max {max}")]
    BatchTooLarge {
        /// Submitted batch size.
        got: usize,
        /// Configured cap.
        max: usize,
    },
}

/// Maps text to embedding vectors. `embed` serves the per-query path;
/// `embed_batch` serves the offline indexing job.
pub trait Embedder: Send + Sync {
    /// Embeds one string into one vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(&[text])?.pop().ok_or(EmbedError::Empty)
    }

    /// Embeds a batch of strings, returning vectors in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}
