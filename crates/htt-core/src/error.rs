//! Error types for the HTT modules

use thiserror::Error;

/// HTT error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid module configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A product requested from the event record is absent.
    #[error("missing product '{label}' in event")]
    MissingProduct {
        /// Product label.
        label: String,
    },

    /// A product exists but holds a different kind of collection.
    #[error("product '{label}' is {found}, expected {expected}")]
    ProductType {
        /// Product label.
        label: String,
        /// Kind that was requested.
        expected: &'static str,
        /// Kind actually stored.
        found: &'static str,
    },

    /// No MET variant was produced for the selected pair.
    #[error("could not find MET in collection for ID: {id}")]
    MissingMet {
        /// Combined lepton id the lookup used.
        id: u64,
    },

    /// No energy-scale factor was provided for the selected object.
    #[error("scale for chosen object {id} not found")]
    MissingScale {
        /// Object id.
        id: u64,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
