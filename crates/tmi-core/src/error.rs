//! Error types and result aliases shared by TMI components.
//!
//! Errors raised here describe malformed input (identifiers, timestamps,
//! code lists) before any program logic runs, so callers can reject a request
//! without side effects.

/// The result type used throughout tmi-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building core primitives.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A timestamp could not be parsed in any accepted format.
    #[error("invalid timestamp for {field}: '{value}'")]
    InvalidTimestamp {
        /// The input field the timestamp came from.
        field: String,
        /// The raw text that failed to parse.
        value: String,
    },

    /// A required field was absent.
    #[error("missing required field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates an invalid timestamp error for the named field.
    #[must_use]
    pub fn invalid_timestamp(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a missing field error.
    #[must_use]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Returns true if the error was caused by caller input.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidId { .. }
                | Self::InvalidInput(_)
                | Self::InvalidTimestamp { .. }
                | Self::MissingField { .. }
        )
    }
}
