//! Error types for ripple-core
//!
//! Only structural misuse is reported through [`Error`]. Recoverable
//! situations (renaming an unknown id, a failing validation predicate, the
//! resolution ceiling) are logged with `tracing` and do not surface here.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Invalid id for entity of type '{type_name}': {reason}")]
    InvalidId { type_name: String, reason: String },

    #[error("Object \"{type_name}|{id}\" has already been registered")]
    DuplicateRegistration { type_name: String, id: String },

    #[error("Entity '{id}' was expected to be of type '{expected}' but is of type '{found}'")]
    TypeMismatch {
        id: String,
        expected: String,
        found: String,
    },

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Type already defined: {0}")]
    DuplicateType(String),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Property already defined: {0}")]
    DuplicateProperty(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid format '{format}': {reason}")]
    InvalidFormat { format: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Rule error: {0}")]
    Rule(String),
}

impl Error {
    /// Build a rule failure from any displayable message
    pub fn rule(message: impl Into<String>) -> Self {
        Error::Rule(message.into())
    }

    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
