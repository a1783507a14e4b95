//! Error types for program simulation and application.

use tmi_core::ProgramId;

use crate::store::CommitStep;

/// The result type used throughout tmi-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in program operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request failed validation; nothing was written.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A program was not found.
    #[error("program not found: {program_id}")]
    ProgramNotFound {
        /// The program ID that was looked up.
        program_id: String,
    },

    /// An invalid state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// Apply found no controlled flights in the staging area.
    #[error("nothing to apply for {program_id}: no controlled flights in sandbox")]
    NothingToApply {
        /// The program being applied.
        program_id: ProgramId,
    },

    /// The shared staging area holds another program's plan.
    #[error("sandbox for {program_id} was overwritten by {owner}; simulate again before applying")]
    SandboxConflict {
        /// The program being applied.
        program_id: ProgramId,
        /// The program whose plan currently occupies the sandbox.
        owner: ProgramId,
    },

    /// The program row changed between read and commit.
    #[error("version conflict on {program_id}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        /// The program whose row changed.
        program_id: ProgramId,
        /// The version read at the start of the operation.
        expected: Option<u64>,
        /// The version found at commit time.
        actual: Option<u64>,
    },

    /// An atomic commit failed and was rolled back.
    #[error("{operation} failed at step {step}; rolled back: {source}")]
    CommitFailed {
        /// The operation being committed (simulate, apply, purge, ...).
        operation: String,
        /// The step that failed.
        step: CommitStep,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration was invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An error from tmi-core.
    #[error("core error: {0}")]
    Core(#[from] tmi_core::Error),
}

impl Error {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a program-not-found error.
    #[must_use]
    pub fn program_not_found(program_id: impl std::fmt::Display) -> Self {
        Self::ProgramNotFound {
            program_id: program_id.to_string(),
        }
    }

    /// Returns true if the caller's input was rejected before any write.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation { .. } => true,
            Self::Core(core) => core.is_input_error(),
            _ => false,
        }
    }

    /// Returns the failing commit step, if this is a rolled-back commit.
    #[must_use]
    pub const fn failed_step(&self) -> Option<CommitStep> {
        match self {
            Self::CommitFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}
