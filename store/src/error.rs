//! Error types for snapshot storage operations.
//!
//! Provides a unified error type covering configuration loading, snapshot
//! tree writes, watermark state, and audit export.

use catalog_snapshot_core::CatalogError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Configuration validation failure (e.g., missing required fields).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catalog failure that aborts an export phase.
    #[error("catalog error: {0}")]
    CatalogError(#[from] CatalogError),
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
