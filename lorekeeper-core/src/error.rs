//! Error types for the lorekeeper core library.

use thiserror::Error;

use crate::types::SaveId;

/// Top-level error type for all lorekeeper core operations.
///
/// Generator and validator failures are deliberately absent: those are
/// recovered into a fallback delta (see [`crate::delta::DeltaError`]).
#[derive(Error, Debug)]
pub enum LoreError {
    /// A level-up resolution was requested while none is pending.
    #[error("No level-up is pending for this player")]
    NoLevelUpPending,

    /// An inbound request is missing a required key.
    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    /// A player construction override was out of range.
    #[error("Invalid player override for `{field}`: {reason}")]
    InvalidOverride {
        /// Which override was rejected.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested scenario template does not exist.
    #[error("Invalid scenario: {0}")]
    UnknownScenario(String),

    /// No save exists under the given identifier.
    #[error("Save not found: {0}")]
    SaveNotFound(SaveId),

    /// A save identifier could not be parsed.
    #[error("Invalid save id: {0}")]
    InvalidSaveId(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, LoreError>;
