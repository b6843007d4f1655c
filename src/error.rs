//! Workflow error taxonomy.
//!
//! Every operation returns these as typed results; state-machine violations
//! always surface to the caller and are never coerced into a different
//! outcome. Only collaborator-side audit writes are allowed to fail quietly.

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Malformed input; recoverable by caller correction.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The subject reference could not be resolved to a registered account
    /// or a walk-in snapshot. Fatal to the create call, never auto-corrected
    /// into a guessed record.
    #[error("identity resolution failed: {0}")]
    IdentityResolution(String),

    /// Attempted transition violates the state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Duplicate booking detected for the same account/service/date.
    #[error("booking conflict: {0}")]
    Conflict(String),

    /// Stale optimistic version; the caller must re-read and retry.
    #[error("concurrent modification of {entity} {id}: stale version")]
    ConcurrentModification { entity: &'static str, id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The actor's role does not permit the attempted action.
    #[error("role {role} may not {action}")]
    Forbidden {
        action: &'static str,
        role: &'static str,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl WorkflowError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
