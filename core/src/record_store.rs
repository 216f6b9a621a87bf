//! Record store trait and related types.
//!
//! This module defines the persistence contract behind the ID card workflow: a
//! keyed store over four active tables, two append-only history tables and the
//! login registry.
//!
//! # Design
//!
//! The store offers plain keyed access (insert, find, update, delete) plus two
//! move primitives:
//!
//! - [`RecordStore::archive`] moves an active row into its history table
//! - [`RecordStore::relocate`] moves a row between active tables
//!
//! History rows carry the [`RowRef`] of the row they were copied from, and a
//! history table holds at most one row per source row. That makes
//! [`RecordStore::append_history`] idempotent, so the default `archive`
//! (copy, then delete) can be retried after a partial failure without
//! duplicating history. Stores with transactions override `archive` to run both
//! steps atomically.
//!
//! # Implementations
//!
//! - `PostgresRecordStore` (in `idcard-workflow-postgres`): production implementation
//! - `InMemoryRecordStore` (in `idcard-workflow-testing`): fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use idcard_workflow_core::record::{NewRequest, RequestRecord};
//! use idcard_workflow_core::record_store::{RecordStore, RecordStoreError};
//! use idcard_workflow_core::registrant::RegistrantId;
//! use idcard_workflow_core::table::ActiveTable;
//! use idcard_workflow_core::Utc;
//!
//! async fn example<S: RecordStore>(store: &S) -> Result<(), RecordStoreError> {
//!     let record = RequestRecord::submitted(NewRequest::new("21CS001", "A"), Utc::now());
//!     store.insert(ActiveTable::Pending, record).await?;
//!
//!     let found = store
//!         .find_one(ActiveTable::Pending, RegistrantId::new("21CS001"))
//!         .await?;
//!     assert!(found.is_some());
//!     Ok(())
//! }
//! ```

use crate::record::{HistoryRecord, RequestPatch, RequestRecord, Stored};
use crate::registrant::{RegistrantId, RowRef};
use crate::table::{ActiveTable, HistoryTable};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every [`RecordStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RecordStoreError>> + Send + 'a>>;

/// Errors that can occur during record store operations.
#[derive(Error, Debug)]
pub enum RecordStoreError {
    /// A unique table already holds a row for this identifier.
    ///
    /// Two racing submissions for the same identifier end here: the store
    /// accepts the first and rejects the second.
    #[error("{table} already holds a row for {identifier}")]
    Conflict {
        /// Table whose uniqueness constraint was violated.
        table: ActiveTable,
        /// Colliding identifier.
        identifier: RegistrantId,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Stored data could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result of appending a history row or archiving an active row.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// A new history row was written.
    Archived,
    /// The history table already held a row for this source row.
    AlreadyArchived,
    /// Only from [`RecordStore::archive`]: the source row was already gone,
    /// removed by another archive of the same row. This call moved nothing.
    SourceGone,
}

impl ArchiveOutcome {
    /// Whether this call removed the source row from its active table.
    ///
    /// `AlreadyArchived` counts: the history copy came from an earlier,
    /// interrupted attempt, but the row leaves the active table now.
    #[must_use]
    pub const fn moved_source(self) -> bool {
        !matches!(self, Self::SourceGone)
    }
}

/// Persistence contract for the ID card workflow.
///
/// # Tables
///
/// `Pending`, `PrintQueue` and `Rejected` hold at most one row per identifier
/// and reject a second with [`RecordStoreError::Conflict`]. `Accepted` may hold
/// several. History tables are append-only and may hold many rows per
/// identifier, but only one per source row.
///
/// An identifier may sit in `Accepted` and one other active table at once (a
/// new request after pickup), but never in two of `Pending`, `PrintQueue` and
/// `Rejected`. [`RecordStore::submit`] and [`RecordStore::relocate`] keep that
/// rule: for one identifier they run one at a time and each sees the other's
/// committed result. [`RecordStore::insert`] only checks the target table.
///
/// # Ordering
///
/// Every method returning several rows orders them by creation time, newest
/// first.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn RecordStore>`.
pub trait RecordStore: Send + Sync {
    /// Insert `record` into `table`, returning it with its new row reference.
    ///
    /// # Errors
    ///
    /// - `Conflict`: `table` is unique and already holds the identifier
    /// - `DatabaseError`: the write failed
    fn insert(
        &self,
        table: ActiveTable,
        record: RequestRecord,
    ) -> StoreFuture<'_, Stored<RequestRecord>>;

    /// Insert a new submission into `Pending`.
    ///
    /// Refused if the identifier is in any of
    /// [`ActiveTable::SUBMISSION_BLOCKERS`]. The check and the insert are one
    /// atomic step with respect to other `submit` and `relocate` calls for the
    /// same identifier, so a request rejected or approved mid-submission is
    /// never left next to a fresh pending row.
    ///
    /// # Errors
    ///
    /// - `Conflict`: the first blocking table, in precedence order, that holds
    ///   the identifier
    /// - `DatabaseError`: the write failed
    fn submit(&self, record: RequestRecord) -> StoreFuture<'_, Stored<RequestRecord>>;

    /// Find the row for `identifier` in `table`.
    ///
    /// For `Accepted`, which may hold several, the newest row is returned.
    /// Absence is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the query failed
    fn find_one(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>>;

    /// Find every row for `identifier` in `table`, newest first.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the query failed
    fn find_many(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<RequestRecord>>>;

    /// List every row in `table`, newest first.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the query failed
    fn find_all(&self, table: ActiveTable) -> StoreFuture<'_, Vec<Stored<RequestRecord>>>;

    /// Apply `patch` to the row for `identifier` (the newest, for `Accepted`).
    ///
    /// Returns the updated row, or `Ok(None)` if there is none.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the write failed
    fn update(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
        patch: RequestPatch,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>>;

    /// Delete exactly one row by its reference.
    ///
    /// Returns `false` if the row no longer exists.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the write failed
    fn delete(&self, table: ActiveTable, row: RowRef) -> StoreFuture<'_, bool>;

    /// Append `entry` to `table` unless a row for `entry.source_row` is
    /// already there.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the write failed
    fn append_history(
        &self,
        table: HistoryTable,
        entry: HistoryRecord,
    ) -> StoreFuture<'_, ArchiveOutcome>;

    /// Every history row for `identifier` in `table`, newest first.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the query failed
    fn find_history(
        &self,
        table: HistoryTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<HistoryRecord>>>;

    /// Move the active row `entry.source_row` into `table`.
    ///
    /// The source row lives in `table.provenance()`. The default
    /// implementation appends the history row, then deletes the source. If the
    /// delete fails, calling `archive` again with the same entry is safe: the
    /// append reports [`ArchiveOutcome::AlreadyArchived`] and the delete is
    /// retried. When two archives of one row overlap, exactly one removes the
    /// source; the other reports [`ArchiveOutcome::SourceGone`].
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: either step failed
    fn archive(
        &self,
        table: HistoryTable,
        entry: HistoryRecord,
    ) -> StoreFuture<'_, ArchiveOutcome> {
        Box::pin(async move {
            let source = table.provenance();
            let row = entry.source_row;
            let outcome = self.append_history(table, entry).await?;
            if self.delete(source, row).await? {
                Ok(outcome)
            } else {
                Ok(ArchiveOutcome::SourceGone)
            }
        })
    }

    /// Atomically move row `row` from `from` into `to`, stamping `updated_at`.
    ///
    /// The moved row gets a new row reference in `to`. Returns `Ok(None)` if
    /// the source row no longer exists; nothing is written in that case.
    ///
    /// # Errors
    ///
    /// - `Conflict`: `to` is unique and already holds the identifier; the
    ///   source row is left in place
    /// - `DatabaseError`: the move failed and was rolled back
    fn relocate(
        &self,
        from: ActiveTable,
        row: RowRef,
        to: ActiveTable,
        updated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>>;

    /// Whether `identifier` is on the login allowlist.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the query failed
    fn registry_contains(&self, identifier: RegistrantId) -> StoreFuture<'_, bool>;

    /// Add `identifier` to the login allowlist. Adding twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`: the write failed
    fn register(&self, identifier: RegistrantId) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_error_display() {
        let error = RecordStoreError::Conflict {
            table: ActiveTable::Pending,
            identifier: RegistrantId::new("21CS001"),
        };
        assert_eq!(error.to_string(), "pending already holds a row for 21CS001");
    }

    #[test]
    fn only_source_gone_moves_nothing() {
        assert!(ArchiveOutcome::Archived.moved_source());
        assert!(ArchiveOutcome::AlreadyArchived.moved_source());
        assert!(!ArchiveOutcome::SourceGone.moved_source());
    }

    #[test]
    fn database_error_display() {
        let error = RecordStoreError::DatabaseError("connection refused".to_string());
        assert!(error.to_string().contains("connection refused"));
    }
}
