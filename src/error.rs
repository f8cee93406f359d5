//! Error taxonomy for the retrieval engine and the activity cache.
//!
//! Library modules return [`Result`]; the CLI and config loader wrap these
//! in `anyhow` with context.
//!
//! "Not enough grounded context" is deliberately absent: it is a valid
//! outcome reported as `sufficient: false` on a
//! [`QueryOutcome`](crate::models::QueryOutcome).

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The embedder was unreachable or produced an unusable vector.
    #[error("embedding failed: {message}")]
    Embedding { message: String },

    /// A refetch failed and no cached value was available to fall back on.
    #[error("cache fetch failed for '{key}': {message}")]
    CacheFetch { key: String, message: String },

    /// A stored chunk could not be used (bad vector text, wrong dimension).
    #[error("malformed chunk {chunk_id}: {message}")]
    MalformedChunk { chunk_id: String, message: String },

    /// An external activity source failed.
    #[error("upstream request failed: {message}")]
    Upstream { message: String },

    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn malformed(chunk_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedChunk {
            chunk_id: chunk_id.into(),
            message: message.into(),
        }
    }
}
