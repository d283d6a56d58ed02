//! Error types for lsmkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for lsmkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// A table file (or its name) does not match the on-disk layout
    #[error("Format error: {0}")]
    Format(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Engine State Errors
    // -------------------------------------------------------------------------
    /// A previous flush failed; memory and disk may disagree
    #[error("Engine poisoned by an earlier flush failure")]
    Poisoned,
}

impl KvError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        KvError::Format(msg.into())
    }
}
