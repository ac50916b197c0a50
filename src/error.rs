//! Error types for the artifact cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the artifact cache
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Data Path Errors
    // =========================================================================
    /// Logical key unresolved, or its blob is missing/expired
    #[error("Entry not found for key: {key}")]
    EntryNotFound { key: String },

    /// One of the writes of a put failed at the store layer
    #[error("Write to {store} store failed: {reason}")]
    StoreWriteFailure { store: String, reason: String },

    /// Sequence generator or store cluster unreachable
    #[error("Storage cluster unavailable: {0}")]
    Unavailable(String),

    /// Empty key set supplied to a write
    #[error("Invalid key set: {0}")]
    InvalidKeySet(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Data operation invoked outside the Started state
    #[error("Operation '{operation}' requires a started engine (current state: {state})")]
    NotStarted {
        operation: &'static str,
        state: String,
    },

    /// Lifecycle transition not allowed from the current state
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("Failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a not-found error for a logical key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::EntryNotFound { key: key.into() }
    }

    /// Build a write failure tagged with the store it happened in.
    pub fn write_failure(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::StoreWriteFailure {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// True for a plain cache miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, Error::EntryNotFound { .. })
    }

    /// True when the caller may retry the same call.
    ///
    /// A retried put allocates a fresh identifier, so a failed write can never
    /// be observed as a half-written entry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreWriteFailure { .. } | Error::Unavailable(_)
        )
    }
}
