//! Engine error types.
//!
//! Only [`EngineError`] crosses the crate boundary. The per-row errors
//! ([`TransformError`], [`LoadError`]) end up as failed row outcomes and never
//! abort a run; a [`SequenceError`] ends the run as `failed`.

use ferry_client::{ClientError, WriteError};
use ferry_core::errors::CoreError;
use ferry_db::error::DatabaseError;
use thiserror::Error;

/// Errors returned by [`crate::JobScheduler`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was rejected before anything was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    /// The job's current state does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::NotFound { entity_type, id } => Self::InvalidState(format!(
                "{entity_type} not found: {id}"
            )),
            CoreError::InvalidTransition { .. } => Self::InvalidState(err.to_string()),
        }
    }
}

/// Map a missing-row database error to [`EngineError::NotFound`].
pub(crate) fn not_found(entity_type: &'static str, id: &str) -> impl FnOnce(DatabaseError) -> EngineError {
    let id = id.to_string();
    move |err| match err {
        DatabaseError::NoResult => EngineError::NotFound { entity_type, id },
        DatabaseError::InvalidState(msg) => EngineError::InvalidState(msg),
        other => EngineError::Database(other),
    }
}

/// A page of the source sequence could not be read. Ends the run.
#[derive(Debug, Error)]
#[error("reading page {page} of '{entity}' failed: {source}")]
pub struct SequenceError {
    pub entity: String,
    /// 1-based page number within the run.
    pub page: u64,
    #[source]
    pub source: ClientError,
}

/// A mapping entry could not be applied to a row.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("field '{dest_field}' (from '{source_field}'): {reason}")]
pub struct TransformError {
    pub dest_field: String,
    pub source_field: String,
    pub reason: String,
}

/// A destination write failed for good on this attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// Still failing after the in-process try ceiling.
    #[error("{message} (gave up after {tries} tries)")]
    Transient { message: String, tries: u32 },

    /// Rejected by the destination; not retried in-process.
    #[error("{message}")]
    Permanent { message: String, tries: u32 },
}

impl LoadError {
    #[must_use]
    pub const fn tries(&self) -> u32 {
        match self {
            Self::Transient { tries, .. } | Self::Permanent { tries, .. } => *tries,
        }
    }

    pub(crate) fn from_write(err: WriteError, tries: u32) -> Self {
        match err {
            WriteError::Transient { message, .. } => Self::Transient { message, tries },
            WriteError::Permanent { message } => Self::Permanent { message, tries },
        }
    }
}
