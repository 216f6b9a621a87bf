//! Workflow error taxonomy.
//!
//! Every operation the gateway calls returns [`WorkflowError`]. None of them
//! retries automatically; the variants say how the caller should react.

use crate::record_store::RecordStoreError;
use crate::registrant::RegistrantId;
use crate::state::{InvalidTransition, RequestState, Transition};
use crate::table::ActiveTable;
use thiserror::Error;

/// Errors returned by workflow operations.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A required field is missing. Reported to the caller, never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The identifier already has a live request where a new one was attempted.
    ///
    /// This is the expected outcome of two submissions racing, not a failure.
    #[error("{table} already holds a request for {identifier}")]
    Conflict {
        /// Table that already holds the identifier.
        table: ActiveTable,
        /// Identifier that collided.
        identifier: RegistrantId,
    },

    /// Lookup or transfer target is absent.
    #[error("No {table} request for {identifier}")]
    NotFound {
        /// Table that was searched.
        table: ActiveTable,
        /// Identifier that was looked up.
        identifier: RegistrantId,
    },

    /// An administrative transition does not apply to the request's state.
    #[error("Cannot {transition} request {identifier} in state {state}")]
    InvalidTransition {
        /// Identifier the transition was attempted on.
        identifier: RegistrantId,
        /// State the request was in.
        state: RequestState,
        /// Transition that was attempted.
        transition: Transition,
    },

    /// Underlying storage failed.
    #[error("Store error: {0}")]
    Store(RecordStoreError),
}

impl WorkflowError {
    /// Build an `InvalidTransition` for `identifier`.
    #[must_use]
    pub fn invalid_transition(identifier: RegistrantId, error: InvalidTransition) -> Self {
        Self::InvalidTransition {
            identifier,
            state: error.state,
            transition: error.transition,
        }
    }

    /// Message safe to show an end user.
    ///
    /// Storage failures are collapsed to a generic message; the details belong
    /// in logs, not in responses.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Conflict { identifier, .. } => {
                format!("A request for {identifier} already exists")
            }
            Self::NotFound { identifier, .. } => format!("No request found for {identifier}"),
            Self::InvalidTransition { .. } => self.to_string(),
            Self::Store(_) => "The request could not be processed, please try again later".to_string(),
        }
    }

    /// Whether this is a storage failure rather than a caller error.
    #[must_use]
    pub const fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<RecordStoreError> for WorkflowError {
    fn from(error: RecordStoreError) -> Self {
        match error {
            RecordStoreError::Conflict { table, identifier } => Self::Conflict { table, identifier },
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_maps_to_conflict() {
        let error = WorkflowError::from(RecordStoreError::Conflict {
            table: ActiveTable::Pending,
            identifier: RegistrantId::new("21CS001"),
        });
        assert!(matches!(error, WorkflowError::Conflict { .. }));
        assert_eq!(error.user_message(), "A request for 21CS001 already exists");
    }

    #[test]
    fn store_failure_is_not_leaked_to_users() {
        let error = WorkflowError::from(RecordStoreError::DatabaseError(
            "password authentication failed".to_string(),
        ));
        assert!(error.is_store_failure());
        assert!(!error.user_message().contains("password"));
    }
}
