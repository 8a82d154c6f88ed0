//! Error types for ripple-serde

use thiserror::Error;

/// Serialization error type
#[derive(Debug, Error)]
pub enum Error {
    /// The model rejected a lookup or read
    #[error(transparent)]
    Core(#[from] ripple_core::Error),

    /// Rendering the JSON text failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for serialization
pub type Result<T> = std::result::Result<T, Error>;
