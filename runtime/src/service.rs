//! The workflow service: every operation the request gateway calls.
//!
//! Status resolution lives in [`crate::resolver`] and archival in
//! [`crate::transfer`]; this module holds the service itself plus the
//! submission, lookup, annotation and transition operations.

use crate::config::WorkflowConfig;
use crate::telemetry;
use idcard_workflow_core::environment::Clock;
use idcard_workflow_core::record::{HistoryRecord, NewRequest, RequestPatch, RequestRecord};
use idcard_workflow_core::record_store::{RecordStore, RecordStoreError};
use idcard_workflow_core::registrant::RegistrantId;
use idcard_workflow_core::state::Transition;
use idcard_workflow_core::table::{ActiveTable, HistoryTable};
use idcard_workflow_core::WorkflowError;
use std::sync::Arc;

/// Request-scoped operations over a shared record store.
///
/// The service holds no mutable state of its own; every call is independent
/// and the store's atomic `submit` and `relocate` are the only concurrency
/// guard. Cloning is cheap.
///
/// # Example
///
/// ```ignore
/// let service = WorkflowService::new(store, Arc::new(SystemClock));
/// service.submit_request(NewRequest::new("21CS001", "A")).await?;
/// let view = service.resolve_status(&RegistrantId::new("21CS001")).await?;
/// assert_eq!(view.status, DerivedStatus::UnderReview);
/// ```
#[derive(Clone)]
pub struct WorkflowService {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: WorkflowConfig,
}

impl std::fmt::Debug for WorkflowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowService {
    /// Create a service with the default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, clock, WorkflowConfig::default())
    }

    /// Create a service with an explicit configuration.
    #[must_use]
    pub fn with_config(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> WorkflowConfig {
        self.config
    }

    /// Whether `identifier` is on the login allowlist.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the lookup fails.
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn registry_contains(&self, identifier: &RegistrantId) -> Result<bool, WorkflowError> {
        self.store
            .registry_contains(identifier.clone())
            .await
            .map_err(|e| store_failure("registry_contains", e))
    }

    /// Add `identifier` to the login allowlist.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] for a blank or padded identifier
    /// and [`WorkflowError::Store`] if the write fails.
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn register(&self, identifier: &RegistrantId) -> Result<(), WorkflowError> {
        identifier
            .validate()
            .map_err(|e| WorkflowError::Validation(e.to_string()))?;
        self.store
            .register(identifier.clone())
            .await
            .map_err(|e| store_failure("register", e))?;
        tracing::info!("Registrant added to allowlist");
        Ok(())
    }

    /// Submit a new request into `Pending`.
    ///
    /// Submission is refused while the identifier's derived status keeps the
    /// form disabled (under review, printing, or rejected). The store checks
    /// and inserts in one atomic step, so a racing submission or a transition
    /// landing mid-call is refused the same way.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Validation`]: identifier or name missing, or
    ///   identifier padded with whitespace
    /// - [`WorkflowError::Conflict`]: a live request already blocks submission
    /// - [`WorkflowError::Store`]: storage failed
    #[tracing::instrument(skip_all, fields(identifier = %request.identifier))]
    pub async fn submit_request(&self, request: NewRequest) -> Result<RequestRecord, WorkflowError> {
        request.validate()?;

        let record = RequestRecord::submitted(request, self.clock.now());
        let stored = self
            .store
            .submit(record)
            .await
            .map_err(|e| store_failure("submit_request", e))?;

        tracing::info!(row = %stored.row_ref, "Request submitted");
        metrics::counter!(telemetry::REQUESTS_SUBMITTED).increment(1);
        Ok(stored.into_record())
    }

    /// Every pending request, newest first, with attachment bytes omitted.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the query fails.
    #[tracing::instrument(skip_all)]
    pub async fn list_requests(&self) -> Result<Vec<RequestRecord>, WorkflowError> {
        let rows = self
            .store
            .find_all(ActiveTable::Pending)
            .await
            .map_err(|e| store_failure("list_requests", e))?;
        Ok(rows
            .iter()
            .map(|row| row.record.without_attachment_data())
            .collect())
    }

    /// The pending request for `identifier`, attachment included.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`]: no pending request
    /// - [`WorkflowError::Store`]: storage failed
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn get_request(&self, identifier: &RegistrantId) -> Result<RequestRecord, WorkflowError> {
        self.store
            .find_one(ActiveTable::Pending, identifier.clone())
            .await
            .map_err(|e| store_failure("get_request", e))?
            .map(idcard_workflow_core::Stored::into_record)
            .ok_or_else(|| WorkflowError::NotFound {
                table: ActiveTable::Pending,
                identifier: identifier.clone(),
            })
    }

    /// Overwrite the status label of the pending request for `identifier`.
    ///
    /// Only annotates the row in place; it never moves it between tables
    /// (see [`WorkflowService::advance`]).
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Validation`]: blank status label
    /// - [`WorkflowError::NotFound`]: no pending request
    /// - [`WorkflowError::Store`]: storage failed
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn set_status(
        &self,
        identifier: &RegistrantId,
        status: impl Into<String>,
    ) -> Result<RequestRecord, WorkflowError> {
        let status = status.into();
        if status.trim().is_empty() {
            return Err(WorkflowError::Validation("status is required".to_string()));
        }
        let patch = RequestPatch::status(status, self.clock.now());
        let updated = self
            .store
            .update(ActiveTable::Pending, identifier.clone(), patch)
            .await
            .map_err(|e| store_failure("set_status", e))?
            .ok_or_else(|| WorkflowError::NotFound {
                table: ActiveTable::Pending,
                identifier: identifier.clone(),
            })?;

        tracing::info!(status = %updated.record.status, "Request status updated");
        Ok(updated.into_record())
    }

    /// Whether `identifier` has a row in the print queue.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the lookup fails.
    pub async fn is_queued(&self, identifier: &RegistrantId) -> Result<bool, WorkflowError> {
        self.is_in(ActiveTable::PrintQueue, identifier).await
    }

    /// Whether `identifier` has at least one accepted row.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the lookup fails.
    pub async fn is_accepted(&self, identifier: &RegistrantId) -> Result<bool, WorkflowError> {
        self.is_in(ActiveTable::Accepted, identifier).await
    }

    /// Whether `identifier` has a rejected row.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the lookup fails.
    pub async fn is_rejected(&self, identifier: &RegistrantId) -> Result<bool, WorkflowError> {
        self.is_in(ActiveTable::Rejected, identifier).await
    }

    async fn is_in(&self, table: ActiveTable, identifier: &RegistrantId) -> Result<bool, WorkflowError> {
        let row = self
            .store
            .find_one(table, identifier.clone())
            .await
            .map_err(|e| store_failure("membership", e))?;
        Ok(row.is_some())
    }

    /// Every accepted record for `identifier`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the query fails.
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn list_accepted_for(
        &self,
        identifier: &RegistrantId,
    ) -> Result<Vec<RequestRecord>, WorkflowError> {
        let rows = self
            .store
            .find_many(ActiveTable::Accepted, identifier.clone())
            .await
            .map_err(|e| store_failure("list_accepted_for", e))?;
        Ok(rows.into_iter().map(idcard_workflow_core::Stored::into_record).collect())
    }

    /// Archived accepted records for `identifier`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the query fails.
    pub async fn list_accepted_history_for(
        &self,
        identifier: &RegistrantId,
    ) -> Result<Vec<HistoryRecord>, WorkflowError> {
        self.history_for(HistoryTable::AcceptedHistory, identifier).await
    }

    /// Archived rejected records for `identifier`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if the query fails.
    pub async fn list_rejected_history_for(
        &self,
        identifier: &RegistrantId,
    ) -> Result<Vec<HistoryRecord>, WorkflowError> {
        self.history_for(HistoryTable::RejectedHistory, identifier).await
    }

    #[tracing::instrument(skip_all, fields(identifier = %identifier, %table))]
    async fn history_for(
        &self,
        table: HistoryTable,
        identifier: &RegistrantId,
    ) -> Result<Vec<HistoryRecord>, WorkflowError> {
        let rows = self
            .store
            .find_history(table, identifier.clone())
            .await
            .map_err(|e| store_failure("history_for", e))?;
        Ok(rows.into_iter().map(idcard_workflow_core::Stored::into_record).collect())
    }

    /// Move the request for `identifier` along the lifecycle.
    ///
    /// This is the single place table membership changes between active
    /// tables. The current state is resolved first and the transition is
    /// checked against it; the row is then moved atomically by the store.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidTransition`]: the request is not in the
    ///   transition's source state
    /// - [`WorkflowError::Conflict`]: the destination already holds the identifier
    /// - [`WorkflowError::NotFound`]: the source row vanished concurrently
    /// - [`WorkflowError::Store`]: storage failed
    #[tracing::instrument(skip_all, fields(identifier = %identifier, %transition))]
    pub async fn advance(
        &self,
        identifier: &RegistrantId,
        transition: Transition,
    ) -> Result<RequestRecord, WorkflowError> {
        let state = self.resolve_state(identifier).await?;
        let (from, to) = state
            .apply(transition)
            .map_err(|e| WorkflowError::invalid_transition(identifier.clone(), e))?;

        let not_found = || WorkflowError::NotFound {
            table: from,
            identifier: identifier.clone(),
        };
        let source = self
            .store
            .find_one(from, identifier.clone())
            .await
            .map_err(|e| store_failure("advance", e))?
            .ok_or_else(not_found)?;
        let moved = self
            .store
            .relocate(from, source.row_ref, to, self.clock.now())
            .await
            .map_err(|e| store_failure("advance", e))?
            .ok_or_else(not_found)?;

        tracing::info!(%from, %to, row = %moved.row_ref, "Request advanced");
        metrics::counter!(telemetry::TRANSITIONS, "transition" => transition.as_str()).increment(1);
        Ok(moved.into_record())
    }
}

/// Convert a store error for `operation`, logging it at the right level.
///
/// Conflicts are an expected outcome of racing writes; everything else is a
/// storage failure and is logged as an error.
pub(crate) fn store_failure(operation: &'static str, error: RecordStoreError) -> WorkflowError {
    match &error {
        RecordStoreError::Conflict { table, identifier } => {
            tracing::info!(operation, %table, %identifier, "Write refused: request already live");
            metrics::counter!(telemetry::REQUESTS_CONFLICTS, "table" => table.as_str()).increment(1);
        }
        RecordStoreError::DatabaseError(_) | RecordStoreError::SerializationError(_) => {
            tracing::error!(operation, error = %error, "Record store operation failed");
        }
    }
    WorkflowError::from(error)
}
