//! Cross-cutting error types for Ferry.
//!
//! Domain-specific errors (`DatabaseError`, `ClientError`, `EngineError`) are
//! defined in their respective crates. A unified error is deferred to
//! `ferry-cli` where all crate errors converge through `anyhow`.

use thiserror::Error;

/// Errors that can be raised by any Ferry crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    /// A state machine transition was attempted that is not allowed.
    #[error("Invalid state transition: {entity_type} {id} from {from} to {to}")]
    InvalidTransition {
        entity_type: String,
        id: String,
        from: String,
        to: String,
    },

    /// Data failed validation (job spec, mapping, constraints).
    #[error("Validation error: {0}")]
    Validation(String),
}
