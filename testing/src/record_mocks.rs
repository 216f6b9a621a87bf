//! In-memory record store testing utilities
//!
//! Provides fast, deterministic stand-ins for the production record store:
//! - [`InMemoryRecordStore`]: `HashMap`-backed store with the full table contract
//! - [`FlakyRecordStore`]: wrapper that fails chosen operations, for partial-failure tests

use idcard_workflow_core::record::{HistoryRecord, RequestPatch, RequestRecord, Stored};
use idcard_workflow_core::record_store::{
    ArchiveOutcome, RecordStore, RecordStoreError, StoreFuture,
};
use idcard_workflow_core::registrant::{RegistrantId, RowRef};
use idcard_workflow_core::table::{ActiveTable, HistoryTable};
use idcard_workflow_core::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    next_row: i64,
    active: HashMap<ActiveTable, Vec<Stored<RequestRecord>>>,
    history: HashMap<HistoryTable, Vec<Stored<HistoryRecord>>>,
    registry: HashSet<RegistrantId>,
}

impl Tables {
    fn allocate_row(&mut self) -> RowRef {
        self.next_row += 1;
        RowRef::new(self.next_row)
    }

    fn rows(&self, table: ActiveTable) -> &[Stored<RequestRecord>] {
        self.active.get(&table).map(Vec::as_slice).unwrap_or_default()
    }

    fn matching(&self, table: ActiveTable, identifier: &RegistrantId) -> Vec<Stored<RequestRecord>> {
        let mut rows: Vec<_> = self
            .rows(table)
            .iter()
            .filter(|row| &row.record.identifier == identifier)
            .cloned()
            .collect();
        newest_first(&mut rows);
        rows
    }

    fn holds(&self, table: ActiveTable, identifier: &RegistrantId) -> bool {
        self.rows(table)
            .iter()
            .any(|row| &row.record.identifier == identifier)
    }
}

fn newest_first(rows: &mut [Stored<RequestRecord>]) {
    rows.sort_by(|a, b| {
        b.record
            .created_at
            .cmp(&a.record.created_at)
            .then(b.row_ref.cmp(&a.row_ref))
    });
}

/// In-memory record store for fast, deterministic testing.
///
/// Enforces the same uniqueness rules as the production store. `archive` uses
/// the trait's default copy-then-delete, so tests against this store exercise
/// the idempotent path; `submit` and `relocate` each run under a single write
/// lock.
///
/// # Example
///
/// ```
/// use idcard_workflow_testing::InMemoryRecordStore;
/// use idcard_workflow_core::record::{NewRequest, RequestRecord};
/// use idcard_workflow_core::record_store::RecordStore;
/// use idcard_workflow_core::table::ActiveTable;
/// use idcard_workflow_core::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryRecordStore::new();
/// let record = RequestRecord::submitted(NewRequest::new("21CS001", "A"), Utc::now());
/// store.insert(ActiveTable::Pending, record.clone()).await?;
///
/// // Pending is unique per identifier
/// assert!(store.insert(ActiveTable::Pending, record).await.is_err());
/// assert_eq!(store.active_len(ActiveTable::Pending), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRecordStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, RecordStoreError> {
        self.tables
            .read()
            .map_err(|e| RecordStoreError::DatabaseError(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, RecordStoreError> {
        self.tables
            .write()
            .map_err(|e| RecordStoreError::DatabaseError(format!("lock poisoned: {e}")))
    }

    /// Number of rows in an active table
    ///
    /// Useful for assertions in tests.
    #[must_use]
    pub fn active_len(&self, table: ActiveTable) -> usize {
        self.read().map_or(0, |tables| tables.rows(table).len())
    }

    /// Number of rows in a history table
    #[must_use]
    pub fn history_len(&self, table: HistoryTable) -> usize {
        self.read()
            .map_or(0, |tables| tables.history.get(&table).map_or(0, Vec::len))
    }

    fn insert_now(
        &self,
        table: ActiveTable,
        record: RequestRecord,
    ) -> Result<Stored<RequestRecord>, RecordStoreError> {
        let mut tables = self.write()?;
        if table.is_unique() && tables.holds(table, &record.identifier) {
            return Err(RecordStoreError::Conflict {
                table,
                identifier: record.identifier,
            });
        }
        let row = Stored::new(tables.allocate_row(), record);
        tables.active.entry(table).or_default().push(row.clone());
        Ok(row)
    }

    fn submit_now(&self, record: RequestRecord) -> Result<Stored<RequestRecord>, RecordStoreError> {
        let mut tables = self.write()?;
        if let Some(table) = ActiveTable::SUBMISSION_BLOCKERS
            .into_iter()
            .find(|table| tables.holds(*table, &record.identifier))
        {
            return Err(RecordStoreError::Conflict {
                table,
                identifier: record.identifier,
            });
        }
        let row = Stored::new(tables.allocate_row(), record);
        tables
            .active
            .entry(ActiveTable::Pending)
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    fn update_now(
        &self,
        table: ActiveTable,
        identifier: &RegistrantId,
        patch: &RequestPatch,
    ) -> Result<Option<Stored<RequestRecord>>, RecordStoreError> {
        let mut tables = self.write()?;
        let Some(target) = tables.matching(table, identifier).first().map(|row| row.row_ref) else {
            return Ok(None);
        };
        let row = tables
            .active
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|row| row.row_ref == target));
        Ok(row.map(|row| {
            patch.apply(&mut row.record);
            row.clone()
        }))
    }

    fn delete_now(&self, table: ActiveTable, row: RowRef) -> Result<bool, RecordStoreError> {
        let mut tables = self.write()?;
        let Some(rows) = tables.active.get_mut(&table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|stored| stored.row_ref != row);
        Ok(rows.len() < before)
    }

    fn append_history_now(
        &self,
        table: HistoryTable,
        entry: HistoryRecord,
    ) -> Result<ArchiveOutcome, RecordStoreError> {
        let mut tables = self.write()?;
        let already = tables
            .history
            .get(&table)
            .is_some_and(|rows| rows.iter().any(|row| row.record.source_row == entry.source_row));
        if already {
            return Ok(ArchiveOutcome::AlreadyArchived);
        }
        let row = Stored::new(tables.allocate_row(), entry);
        tables.history.entry(table).or_default().push(row);
        Ok(ArchiveOutcome::Archived)
    }

    fn find_history_now(
        &self,
        table: HistoryTable,
        identifier: &RegistrantId,
    ) -> Result<Vec<Stored<HistoryRecord>>, RecordStoreError> {
        let tables = self.read()?;
        let mut rows: Vec<_> = tables
            .history
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| &row.record.identifier == identifier)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            b.record
                .archived_at
                .cmp(&a.record.archived_at)
                .then(b.row_ref.cmp(&a.row_ref))
        });
        Ok(rows)
    }

    fn relocate_now(
        &self,
        from: ActiveTable,
        row: RowRef,
        to: ActiveTable,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Stored<RequestRecord>>, RecordStoreError> {
        let mut tables = self.write()?;
        let Some(source) = tables.rows(from).iter().find(|stored| stored.row_ref == row).cloned()
        else {
            return Ok(None);
        };
        if to.is_unique() && tables.holds(to, &source.record.identifier) {
            return Err(RecordStoreError::Conflict {
                table: to,
                identifier: source.record.identifier,
            });
        }
        if let Some(rows) = tables.active.get_mut(&from) {
            rows.retain(|stored| stored.row_ref != row);
        }
        let mut record = source.record;
        record.updated_at = updated_at;
        let moved = Stored::new(tables.allocate_row(), record);
        tables.active.entry(to).or_default().push(moved.clone());
        Ok(Some(moved))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn insert(
        &self,
        table: ActiveTable,
        record: RequestRecord,
    ) -> StoreFuture<'_, Stored<RequestRecord>> {
        Box::pin(future::ready(self.insert_now(table, record)))
    }

    fn submit(&self, record: RequestRecord) -> StoreFuture<'_, Stored<RequestRecord>> {
        Box::pin(future::ready(self.submit_now(record)))
    }

    fn find_one(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        let result = self
            .read()
            .map(|tables| tables.matching(table, &identifier).into_iter().next());
        Box::pin(future::ready(result))
    }

    fn find_many(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<RequestRecord>>> {
        let result = self.read().map(|tables| tables.matching(table, &identifier));
        Box::pin(future::ready(result))
    }

    fn find_all(&self, table: ActiveTable) -> StoreFuture<'_, Vec<Stored<RequestRecord>>> {
        let result = self.read().map(|tables| {
            let mut rows = tables.rows(table).to_vec();
            newest_first(&mut rows);
            rows
        });
        Box::pin(future::ready(result))
    }

    fn update(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
        patch: RequestPatch,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        Box::pin(future::ready(self.update_now(table, &identifier, &patch)))
    }

    fn delete(&self, table: ActiveTable, row: RowRef) -> StoreFuture<'_, bool> {
        Box::pin(future::ready(self.delete_now(table, row)))
    }

    fn append_history(
        &self,
        table: HistoryTable,
        entry: HistoryRecord,
    ) -> StoreFuture<'_, ArchiveOutcome> {
        Box::pin(future::ready(self.append_history_now(table, entry)))
    }

    fn find_history(
        &self,
        table: HistoryTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<HistoryRecord>>> {
        Box::pin(future::ready(self.find_history_now(table, &identifier)))
    }

    fn relocate(
        &self,
        from: ActiveTable,
        row: RowRef,
        to: ActiveTable,
        updated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        Box::pin(future::ready(self.relocate_now(from, row, to, updated_at)))
    }

    fn registry_contains(&self, identifier: RegistrantId) -> StoreFuture<'_, bool> {
        let result = self.read().map(|tables| tables.registry.contains(&identifier));
        Box::pin(future::ready(result))
    }

    fn register(&self, identifier: RegistrantId) -> StoreFuture<'_, ()> {
        let result = self.write().map(|mut tables| {
            tables.registry.insert(identifier);
        });
        Box::pin(future::ready(result))
    }
}

/// Record store wrapper that fails selected operations on demand.
///
/// Each `fail_next_*` call arms a counter; the next N calls of that operation
/// return [`RecordStoreError::DatabaseError`] without touching the inner
/// store. Used to drive the transfer engine into partial failures.
///
/// # Example
///
/// ```
/// use idcard_workflow_testing::{FlakyRecordStore, InMemoryRecordStore};
/// use idcard_workflow_core::record_store::RecordStore;
/// use idcard_workflow_core::registrant::RowRef;
/// use idcard_workflow_core::table::ActiveTable;
///
/// # async fn example() {
/// let store = FlakyRecordStore::new(InMemoryRecordStore::new());
/// store.fail_next_deletes(1);
/// assert!(store.delete(ActiveTable::Accepted, RowRef::new(1)).await.is_err());
/// assert!(store.delete(ActiveTable::Accepted, RowRef::new(1)).await.is_ok());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct FlakyRecordStore {
    inner: InMemoryRecordStore,
    delete_failures: AtomicUsize,
    append_failures: AtomicUsize,
}

impl FlakyRecordStore {
    /// Wrap `inner`; no failures are armed initially.
    #[must_use]
    pub fn new(inner: InMemoryRecordStore) -> Self {
        Self {
            inner,
            delete_failures: AtomicUsize::new(0),
            append_failures: AtomicUsize::new(0),
        }
    }

    /// The wrapped store, for inspecting state in assertions.
    #[must_use]
    pub const fn inner(&self) -> &InMemoryRecordStore {
        &self.inner
    }

    /// Fail the next `count` calls to `delete`.
    pub fn fail_next_deletes(&self, count: usize) {
        self.delete_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` calls to `append_history`.
    pub fn fail_next_appends(&self, count: usize) {
        self.append_failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize, operation: &str) -> Result<(), RecordStoreError> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            Err(RecordStoreError::DatabaseError(format!(
                "injected {operation} failure"
            )))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for FlakyRecordStore {
    fn insert(
        &self,
        table: ActiveTable,
        record: RequestRecord,
    ) -> StoreFuture<'_, Stored<RequestRecord>> {
        self.inner.insert(table, record)
    }

    fn submit(&self, record: RequestRecord) -> StoreFuture<'_, Stored<RequestRecord>> {
        self.inner.submit(record)
    }

    fn find_one(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        self.inner.find_one(table, identifier)
    }

    fn find_many(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<RequestRecord>>> {
        self.inner.find_many(table, identifier)
    }

    fn find_all(&self, table: ActiveTable) -> StoreFuture<'_, Vec<Stored<RequestRecord>>> {
        self.inner.find_all(table)
    }

    fn update(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
        patch: RequestPatch,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        self.inner.update(table, identifier, patch)
    }

    fn delete(&self, table: ActiveTable, row: RowRef) -> StoreFuture<'_, bool> {
        if let Err(e) = Self::take_failure(&self.delete_failures, "delete") {
            return Box::pin(future::ready(Err(e)));
        }
        self.inner.delete(table, row)
    }

    fn append_history(
        &self,
        table: HistoryTable,
        entry: HistoryRecord,
    ) -> StoreFuture<'_, ArchiveOutcome> {
        if let Err(e) = Self::take_failure(&self.append_failures, "append") {
            return Box::pin(future::ready(Err(e)));
        }
        self.inner.append_history(table, entry)
    }

    fn find_history(
        &self,
        table: HistoryTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<HistoryRecord>>> {
        self.inner.find_history(table, identifier)
    }

    fn relocate(
        &self,
        from: ActiveTable,
        row: RowRef,
        to: ActiveTable,
        updated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        self.inner.relocate(from, row, to, updated_at)
    }

    fn registry_contains(&self, identifier: RegistrantId) -> StoreFuture<'_, bool> {
        self.inner.registry_contains(identifier)
    }

    fn register(&self, identifier: RegistrantId) -> StoreFuture<'_, ()> {
        self.inner.register(identifier)
    }
}
