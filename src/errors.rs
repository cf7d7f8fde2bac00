//! Typed error definitions for atomic_sink.
//! Provides a small set of well-known failure modes for better logs and tests.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = AtomicSinkError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AtomicSinkError {
    /// An underlying filesystem call failed. The message names the operation
    /// and path and carries a platform-aware hint where one applies.
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session for {0} already finalized")]
    AlreadyFinalized(PathBuf),

    #[error("Destination already open in group: {0}")]
    AlreadyOpen(PathBuf),

    #[error("Destination not open in group: {0}")]
    NotOpen(PathBuf),
}

impl AtomicSinkError {
    /// True for filesystem failures (as opposed to API misuse).
    pub fn is_io(&self) -> bool {
        matches!(self, AtomicSinkError::Io { .. })
    }
}
