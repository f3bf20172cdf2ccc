//! Error types for the common crate
//!
//! This module defines the common error types used throughout the Model Orchestrator system.

use thiserror::Error;

/// Result type for Model Orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Model Orchestrator operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A preferences file carried a value outside a closed vocabulary
    #[error("Invalid value {value:?} for preference '{field}'")]
    InvalidPreference {
        /// Preference field name
        field: String,
        /// Offending value
        value: String,
    },

    /// Model error
    #[error("Model error: {0}")]
    Model(String),

    /// No model survived requirement filtering
    #[error("No suitable models found: {0}")]
    NoCandidates(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Already exists error
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if the error is an already exists error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// Returns true if no candidate model qualified for a request
    pub fn is_no_candidates(&self) -> bool {
        matches!(self, Error::NoCandidates(_))
    }

    /// Returns true if the error came from validating persisted preferences
    pub fn is_invalid_preference(&self) -> bool {
        matches!(self, Error::InvalidPreference { .. })
    }

    /// Builds an [`Error::InvalidPreference`]
    pub fn invalid_preference(field: impl Into<String>, value: impl Into<String>) -> Self {
        Error::InvalidPreference {
            field: field.into(),
            value: value.into(),
        }
    }
}
