//! Transfer engine: moves accepted and rejected rows into history.
//!
//! Each row is archived through [`RecordStore::archive`], which is safe to
//! repeat for the same source row. A transfer interrupted between the history
//! append and the active delete is therefore completed, not duplicated, by
//! running it again.
//!
//! [`RecordStore::archive`]: idcard_workflow_core::record_store::RecordStore::archive

use crate::service::{WorkflowService, store_failure};
use crate::telemetry;
use futures::stream::{self, StreamExt};
use idcard_workflow_core::record::{HistoryRecord, RequestRecord};
use idcard_workflow_core::record_store::ArchiveOutcome;
use idcard_workflow_core::registrant::RegistrantId;
use idcard_workflow_core::table::ActiveTable;
use idcard_workflow_core::{Stored, WorkflowError};
use serde::{Deserialize, Serialize};

/// Outcome of a rejected-side transfer, shaped for the gateway response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Always `true` when returned; failures surface as errors.
    pub success: bool,
    /// Rows moved.
    pub count: usize,
}

impl WorkflowService {
    /// Archive every accepted row for `identifier` into `AcceptedHistory`.
    ///
    /// Rows are archived concurrently, at most
    /// [`WorkflowConfig::transfer_concurrency`](crate::WorkflowConfig) at a
    /// time. Every row is attempted even if some fail; the first failure is
    /// returned once the batch has finished, and the rows that did succeed stay
    /// archived. Running the transfer again finishes the rest.
    ///
    /// Returns the number of rows this call removed from `Accepted`. A row
    /// another transfer removed first is not counted, so overlapping transfers
    /// add up to the number of rows archived.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`]: no accepted rows exist
    /// - [`WorkflowError::Store`]: at least one row failed to archive
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn transfer_accepted_to_history(
        &self,
        identifier: &RegistrantId,
    ) -> Result<usize, WorkflowError> {
        let rows = self
            .store
            .find_many(ActiveTable::Accepted, identifier.clone())
            .await
            .map_err(|e| store_failure("transfer_accepted_to_history", e))?;
        if rows.is_empty() {
            return Err(WorkflowError::NotFound {
                table: ActiveTable::Accepted,
                identifier: identifier.clone(),
            });
        }

        let total = rows.len();
        let results: Vec<Result<ArchiveOutcome, WorkflowError>> = stream::iter(rows)
            .map(|row| self.archive_row(ActiveTable::Accepted, row))
            .buffer_unordered(self.config.transfer_concurrency)
            .collect()
            .await;

        let mut moved = 0;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(outcome) if outcome.moved_source() => moved += 1,
                Ok(_) => {}
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        if let Some(error) = first_error {
            tracing::warn!(moved, total, "Accepted transfer incomplete, retry to finish");
            return Err(error);
        }

        tracing::info!(moved, "Accepted rows archived");
        Ok(moved)
    }

    /// Archive the rejected row for `identifier` into `RejectedHistory`.
    ///
    /// `count` is 1, or 0 when an overlapping transfer removed the row first.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`]: no rejected row exists; nothing is written
    /// - [`WorkflowError::Store`]: the row failed to archive
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn transfer_rejected_to_history(
        &self,
        identifier: &RegistrantId,
    ) -> Result<TransferReceipt, WorkflowError> {
        let row = self
            .store
            .find_one(ActiveTable::Rejected, identifier.clone())
            .await
            .map_err(|e| store_failure("transfer_rejected_to_history", e))?
            .ok_or_else(|| WorkflowError::NotFound {
                table: ActiveTable::Rejected,
                identifier: identifier.clone(),
            })?;

        let outcome = self.archive_row(ActiveTable::Rejected, row).await?;
        let count = usize::from(outcome.moved_source());
        tracing::info!(count, "Rejected row archived");
        Ok(TransferReceipt {
            success: true,
            count,
        })
    }

    async fn archive_row(
        &self,
        table: ActiveTable,
        row: Stored<RequestRecord>,
    ) -> Result<ArchiveOutcome, WorkflowError> {
        let Some(history) = table.history() else {
            return Err(WorkflowError::Validation(format!("{table} rows are not archived")));
        };
        let entry = HistoryRecord::archive_of(&row, table, self.clock.now());

        match self.store.archive(history, entry).await {
            Ok(outcome) => {
                match outcome {
                    ArchiveOutcome::AlreadyArchived => {
                        tracing::warn!(row = %row.row_ref, %history, "History row already present, finishing interrupted transfer");
                    }
                    ArchiveOutcome::SourceGone => {
                        tracing::debug!(row = %row.row_ref, %history, "Row archived by an overlapping transfer");
                    }
                    ArchiveOutcome::Archived => {}
                }
                if outcome.moved_source() {
                    metrics::counter!(telemetry::TRANSFER_ARCHIVED, "provenance" => table.as_str())
                        .increment(1);
                }
                Ok(outcome)
            }
            Err(error) => {
                metrics::counter!(telemetry::TRANSFER_FAILED, "provenance" => table.as_str())
                    .increment(1);
                Err(store_failure("archive", error))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn receipt_serializes_as_gateway_response() {
        let receipt = TransferReceipt {
            success: true,
            count: 1,
        };
        assert_eq!(
            serde_json::to_string(&receipt).unwrap(),
            r#"{"success":true,"count":1}"#
        );
    }
}
