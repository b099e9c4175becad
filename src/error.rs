//! Error types for pepysfs
//!
//! Provides a unified error type for all disk operations.

use thiserror::Error;

use crate::types::Vid;

/// Result type alias using DiskError
pub type Result<T> = std::result::Result<T, DiskError>;

/// Unified error type for pepysfs operations
#[derive(Debug, Error)]
pub enum DiskError {
    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    /// Bad magic, bad checksum or a superblock/region that fails validation
    #[error("Format error: {0}")]
    Format(String),

    /// Device too small, or a region/request does not fit
    #[error("Size error: {0}")]
    Size(String),

    /// Two on-disk regions intersect
    #[error("Overlap error: {0}")]
    Overlap(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Vid not found: {0}")]
    NotFound(Vid),

    #[error("Duplicate Vid: {0}")]
    DuplicateKey(Vid),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for DiskError {
    fn from(e: bincode::Error) -> Self {
        DiskError::Serialization(e.to_string())
    }
}
