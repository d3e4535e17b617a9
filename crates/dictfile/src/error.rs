//! Error types for dictionary file operations

use thiserror::Error;

/// Result type for dictionary file operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while accessing or persisting a dictionary file
#[derive(Debug, Error)]
pub enum Error {
    /// Lookup for a key that is not present in memory
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// IO error while opening, reading, writing, or deleting the backing file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file's declared counts, lengths, or encoded pairs cannot
    /// be decoded
    #[error("Corrupt dictionary file: {0}")]
    Corrupt(String),

    /// Malformed input to a bulk-construction helper
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// True for the recoverable absent-key case, false for everything fatal.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound(_))
    }
}
