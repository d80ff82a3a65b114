//! # Error Types
//!
//! This module defines error types used throughout the cellfill library.
//!
//! Only configuration errors, template errors, save failures and cancellation
//! abort a generation request. Per-cell, per-sheet and per-image problems are
//! recorded in the [`GenerationReport`](crate::assembler::GenerationReport)
//! instead of being raised.

use thiserror::Error;

use crate::address::AddressError;
use crate::host::HostError;

/// Main error type for cellfill operations
#[derive(Debug, Error)]
pub enum CellfillError {
    /// Invalid mapping or engine configuration, detected at load time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Template missing, truncated, wrong format or missing required sheets
    #[error("Template error: {0}")]
    Template(String),

    /// The document-editing capability reported an error
    #[error("Document host error: {0}")]
    Host(#[from] HostError),

    /// The finished document could not be persisted
    #[error("Save failed: {0}")]
    Save(String),

    /// The request was cancelled before the document was saved
    #[error("Generation cancelled")]
    Cancelled,

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error wrapper
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AddressError> for CellfillError {
    fn from(err: AddressError) -> Self {
        CellfillError::Config(err.to_string())
    }
}
