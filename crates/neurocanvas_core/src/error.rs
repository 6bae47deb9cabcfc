//! Error taxonomy for the fusion and memory core.
//!
//! Fusion errors are fatal to a request. Memory errors are degraded-mode:
//! the coordinator logs them and still answers with the in-memory fusion
//! result. A low-confidence state is not an error at all; it is a flag on
//! [`crate::FusedState`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FusionError {
    /// The modality tag is not one of text, voice or face.
    #[error("unsupported modality: {0}")]
    UnsupportedModality(String),

    /// The request carried no usable sample.
    #[error("no emotional signal available")]
    NoSignalAvailable,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The persistence layer failed to read or write.
    #[error("memory unavailable: {0}")]
    Unavailable(String),

    /// Eviction could not make room for a new record.
    #[error("memory capacity exceeded for session {session} (max {max_entries})")]
    CapacityExceeded { session: String, max_entries: usize },

    /// The embedding length does not match the store's configured dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },
}

impl MemoryError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
