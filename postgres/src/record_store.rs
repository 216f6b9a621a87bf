//! `PostgreSQL` implementation of [`RecordStore`].

use crate::config::PostgresConfig;
use idcard_workflow_core::record::{
    Attachment, HistoryRecord, HolderAttributes, RequestPatch, RequestRecord, Stored,
};
use idcard_workflow_core::record_store::{
    ArchiveOutcome, RecordStore, RecordStoreError, StoreFuture,
};
use idcard_workflow_core::registrant::{RegistrantId, RowRef};
use idcard_workflow_core::table::{ActiveTable, HistoryTable};
use idcard_workflow_core::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgExecutor, Row};

const REQUEST_COLUMNS: &str = "row_ref, identifier, name, date_of_birth, department, year, \
     section, library_code, reason, attachment_media_type, attachment_filename, \
     attachment_data, status, created_at, updated_at";

const HISTORY_COLUMNS: &str = "row_ref, identifier, name, date_of_birth, department, year, \
     section, library_code, reason, created_at, archived_at, provenance, source_row";

/// Backing table for an active table.
const fn active_table_name(table: ActiveTable) -> &'static str {
    match table {
        ActiveTable::Pending => "pending_requests",
        ActiveTable::PrintQueue => "print_queue",
        ActiveTable::Accepted => "accepted_requests",
        ActiveTable::Rejected => "rejected_requests",
    }
}

/// Backing table for a history table.
const fn history_table_name(table: HistoryTable) -> &'static str {
    match table {
        HistoryTable::AcceptedHistory => "accepted_history",
        HistoryTable::RejectedHistory => "rejected_history",
    }
}

fn database_error(e: &sqlx::Error) -> RecordStoreError {
    RecordStoreError::DatabaseError(e.to_string())
}

fn decode_error(e: &sqlx::Error) -> RecordStoreError {
    RecordStoreError::SerializationError(e.to_string())
}

/// Map a failed write, turning unique violations into `Conflict`.
fn write_error(e: &sqlx::Error, table: ActiveTable, identifier: &RegistrantId) -> RecordStoreError {
    if let sqlx::Error::Database(db_err) = e {
        if db_err.is_unique_violation() {
            return RecordStoreError::Conflict {
                table,
                identifier: identifier.clone(),
            };
        }
    }
    database_error(e)
}

fn row_to_request(row: &PgRow) -> Result<Stored<RequestRecord>, RecordStoreError> {
    let get_err = |e: sqlx::Error| decode_error(&e);

    let media_type: Option<String> = row.try_get("attachment_media_type").map_err(get_err)?;
    let filename: Option<String> = row.try_get("attachment_filename").map_err(get_err)?;
    let data: Option<Vec<u8>> = row.try_get("attachment_data").map_err(get_err)?;
    let attachment = match (media_type, filename) {
        (Some(media_type), Some(filename)) => Some(Attachment {
            media_type,
            filename,
            data,
        }),
        _ => None,
    };

    let record = RequestRecord {
        identifier: RegistrantId::new(row.try_get::<String, _>("identifier").map_err(get_err)?),
        holder: holder_from_row(row)?,
        reason: row.try_get("reason").map_err(get_err)?,
        attachment,
        status: row.try_get("status").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    };
    let row_ref = RowRef::new(row.try_get("row_ref").map_err(get_err)?);
    Ok(Stored::new(row_ref, record))
}

fn row_to_history(row: &PgRow) -> Result<Stored<HistoryRecord>, RecordStoreError> {
    let get_err = |e: sqlx::Error| decode_error(&e);

    let provenance: String = row.try_get("provenance").map_err(get_err)?;
    let provenance = ActiveTable::parse(&provenance).ok_or_else(|| {
        RecordStoreError::SerializationError(format!("Invalid provenance: {provenance}"))
    })?;

    let record = HistoryRecord {
        identifier: RegistrantId::new(row.try_get::<String, _>("identifier").map_err(get_err)?),
        holder: holder_from_row(row)?,
        reason: row.try_get("reason").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        archived_at: row.try_get("archived_at").map_err(get_err)?,
        provenance,
        source_row: RowRef::new(row.try_get("source_row").map_err(get_err)?),
    };
    let row_ref = RowRef::new(row.try_get("row_ref").map_err(get_err)?);
    Ok(Stored::new(row_ref, record))
}

fn holder_from_row(row: &PgRow) -> Result<HolderAttributes, RecordStoreError> {
    let get_err = |e: sqlx::Error| decode_error(&e);
    Ok(HolderAttributes {
        name: row.try_get("name").map_err(get_err)?,
        date_of_birth: row.try_get("date_of_birth").map_err(get_err)?,
        department: row.try_get("department").map_err(get_err)?,
        year: row.try_get("year").map_err(get_err)?,
        section: row.try_get("section").map_err(get_err)?,
        library_code: row.try_get("library_code").map_err(get_err)?,
    })
}

async fn insert_request<'e, E>(
    executor: E,
    table: ActiveTable,
    record: &RequestRecord,
) -> Result<Stored<RequestRecord>, RecordStoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        r"
        INSERT INTO {} (
            identifier, name, date_of_birth, department, year, section, library_code,
            reason, attachment_media_type, attachment_filename, attachment_data,
            status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {REQUEST_COLUMNS}
        ",
        active_table_name(table)
    );
    let attachment = record.attachment.as_ref();

    let row = sqlx::query(&sql)
        .bind(record.identifier.as_str())
        .bind(&record.holder.name)
        .bind(record.holder.date_of_birth)
        .bind(&record.holder.department)
        .bind(&record.holder.year)
        .bind(&record.holder.section)
        .bind(&record.holder.library_code)
        .bind(&record.reason)
        .bind(attachment.map(|a| a.media_type.as_str()))
        .bind(attachment.map(|a| a.filename.as_str()))
        .bind(attachment.and_then(|a| a.data.as_deref()))
        .bind(&record.status)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(executor)
        .await
        .map_err(|e| write_error(&e, table, &record.identifier))?;

    row_to_request(&row)
}

async fn insert_history<'e, E>(
    executor: E,
    table: HistoryTable,
    entry: &HistoryRecord,
) -> Result<ArchiveOutcome, RecordStoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        r"
        INSERT INTO {} (
            identifier, name, date_of_birth, department, year, section, library_code,
            reason, created_at, archived_at, provenance, source_row
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (source_row) DO NOTHING
        ",
        history_table_name(table)
    );

    let result = sqlx::query(&sql)
        .bind(entry.identifier.as_str())
        .bind(&entry.holder.name)
        .bind(entry.holder.date_of_birth)
        .bind(&entry.holder.department)
        .bind(&entry.holder.year)
        .bind(&entry.holder.section)
        .bind(&entry.holder.library_code)
        .bind(&entry.reason)
        .bind(entry.created_at)
        .bind(entry.archived_at)
        .bind(entry.provenance.as_str())
        .bind(entry.source_row.value())
        .execute(executor)
        .await
        .map_err(|e| database_error(&e))?;

    Ok(if result.rows_affected() == 1 {
        ArchiveOutcome::Archived
    } else {
        ArchiveOutcome::AlreadyArchived
    })
}

/// Serialize writers that change which tables hold `identifier`.
///
/// Transaction-scoped advisory lock keyed on the identifier; released on
/// commit or rollback.
async fn lock_identifier<'e, E>(executor: E, identifier: &str) -> Result<(), RecordStoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(identifier)
        .execute(executor)
        .await
        .map_err(|e| database_error(&e))?;
    Ok(())
}

/// `PostgreSQL`-backed record store.
///
/// Each logical table maps to its own SQL table (see the crate migrations).
/// Uniqueness is enforced by unique indexes, so racing inserts surface as
/// [`RecordStoreError::Conflict`]. Archival and relocation each run in a
/// single transaction. Submission and relocation also take a per-identifier
/// advisory lock, so the cross-table check in `submit` never reads a
/// half-finished move.
///
/// # Example
///
/// ```no_run
/// use idcard_workflow_postgres::{PostgresConfig, PostgresRecordStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresRecordStore::connect(&PostgresConfig::from_env()).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::DatabaseError`] if the pool cannot connect.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, RecordStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .map_err(|e| RecordStoreError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgreSQL record store connected"
        );
        Ok(Self::from_pool(pool))
    }

    /// Create or upgrade the workflow tables.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), RecordStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RecordStoreError::DatabaseError(format!("Migration failed: {e}")))?;
        tracing::info!("Record store migrations applied");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn select_requests(
        &self,
        table: ActiveTable,
        identifier: Option<&RegistrantId>,
        limit_one: bool,
    ) -> Result<Vec<Stored<RequestRecord>>, RecordStoreError> {
        let filter = if identifier.is_some() {
            "WHERE identifier = $1"
        } else {
            ""
        };
        let limit = if limit_one { "LIMIT 1" } else { "" };
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM {} {filter} ORDER BY created_at DESC, row_ref DESC {limit}",
            active_table_name(table)
        );

        let mut query = sqlx::query(&sql);
        if let Some(identifier) = identifier {
            query = query.bind(identifier.as_str());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

        rows.iter().map(row_to_request).collect()
    }
}

impl RecordStore for PostgresRecordStore {
    fn insert(
        &self,
        table: ActiveTable,
        record: RequestRecord,
    ) -> StoreFuture<'_, Stored<RequestRecord>> {
        Box::pin(async move { insert_request(&self.pool, table, &record).await })
    }

    fn submit(&self, record: RequestRecord) -> StoreFuture<'_, Stored<RequestRecord>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RecordStoreError::DatabaseError(format!("Failed to start transaction: {e}")))?;

            lock_identifier(&mut *tx, record.identifier.as_str()).await?;

            for table in ActiveTable::SUBMISSION_BLOCKERS {
                let sql = format!(
                    "SELECT EXISTS (SELECT 1 FROM {} WHERE identifier = $1)",
                    active_table_name(table)
                );
                let held = sqlx::query_scalar::<_, bool>(&sql)
                    .bind(record.identifier.as_str())
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| database_error(&e))?;
                if held {
                    let _ = tx.rollback().await; // Ignore rollback errors
                    return Err(RecordStoreError::Conflict {
                        table,
                        identifier: record.identifier,
                    });
                }
            }

            let stored = insert_request(&mut *tx, ActiveTable::Pending, &record).await?;

            tx.commit()
                .await
                .map_err(|e| RecordStoreError::DatabaseError(format!("Failed to commit transaction: {e}")))?;
            Ok(stored)
        })
    }

    fn find_one(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        Box::pin(async move {
            let rows = self.select_requests(table, Some(&identifier), true).await?;
            Ok(rows.into_iter().next())
        })
    }

    fn find_many(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<RequestRecord>>> {
        Box::pin(async move { self.select_requests(table, Some(&identifier), false).await })
    }

    fn find_all(&self, table: ActiveTable) -> StoreFuture<'_, Vec<Stored<RequestRecord>>> {
        Box::pin(async move { self.select_requests(table, None, false).await })
    }

    fn update(
        &self,
        table: ActiveTable,
        identifier: RegistrantId,
        patch: RequestPatch,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        Box::pin(async move {
            let name = active_table_name(table);
            let sql = format!(
                r"
                UPDATE {name}
                SET status = COALESCE($2, status), updated_at = $3
                WHERE row_ref = (
                    SELECT row_ref FROM {name}
                    WHERE identifier = $1
                    ORDER BY created_at DESC, row_ref DESC
                    LIMIT 1
                )
                RETURNING {REQUEST_COLUMNS}
                "
            );
            let row = sqlx::query(&sql)
                .bind(identifier.as_str())
                .bind(patch.status.as_deref())
                .bind(patch.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;

            row.as_ref().map(row_to_request).transpose()
        })
    }

    fn delete(&self, table: ActiveTable, row: RowRef) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let sql = format!("DELETE FROM {} WHERE row_ref = $1", active_table_name(table));
            let result = sqlx::query(&sql)
                .bind(row.value())
                .execute(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn append_history(
        &self,
        table: HistoryTable,
        entry: HistoryRecord,
    ) -> StoreFuture<'_, ArchiveOutcome> {
        Box::pin(async move { insert_history(&self.pool, table, &entry).await })
    }

    fn find_history(
        &self,
        table: HistoryTable,
        identifier: RegistrantId,
    ) -> StoreFuture<'_, Vec<Stored<HistoryRecord>>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {HISTORY_COLUMNS} FROM {} WHERE identifier = $1 \
                 ORDER BY archived_at DESC, row_ref DESC",
                history_table_name(table)
            );
            let rows = sqlx::query(&sql)
                .bind(identifier.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;

            rows.iter().map(row_to_history).collect()
        })
    }

    /// Append and delete in one transaction.
    fn archive(
        &self,
        table: HistoryTable,
        entry: HistoryRecord,
    ) -> StoreFuture<'_, ArchiveOutcome> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RecordStoreError::DatabaseError(format!("Failed to start transaction: {e}")))?;

            let outcome = insert_history(&mut *tx, table, &entry).await?;

            let sql = format!(
                "DELETE FROM {} WHERE row_ref = $1",
                active_table_name(table.provenance())
            );
            let deleted = sqlx::query(&sql)
                .bind(entry.source_row.value())
                .execute(&mut *tx)
                .await
                .map_err(|e| database_error(&e))?
                .rows_affected();

            tx.commit()
                .await
                .map_err(|e| RecordStoreError::DatabaseError(format!("Failed to commit transaction: {e}")))?;

            if deleted == 0 {
                tracing::debug!(source_row = %entry.source_row, "Source row already archived elsewhere");
                return Ok(ArchiveOutcome::SourceGone);
            }
            tracing::debug!(
                source_row = %entry.source_row,
                history = %table,
                "Row archived"
            );
            Ok(outcome)
        })
    }

    fn relocate(
        &self,
        from: ActiveTable,
        row: RowRef,
        to: ActiveTable,
        updated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Stored<RequestRecord>>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| RecordStoreError::DatabaseError(format!("Failed to start transaction: {e}")))?;

            let sql = format!(
                "SELECT identifier FROM {} WHERE row_ref = $1",
                active_table_name(from)
            );
            let identifier = sqlx::query_scalar::<_, String>(&sql)
                .bind(row.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| database_error(&e))?;
            let Some(identifier) = identifier else {
                let _ = tx.rollback().await; // Ignore rollback errors
                return Ok(None);
            };
            lock_identifier(&mut *tx, &identifier).await?;

            let sql = format!(
                "DELETE FROM {} WHERE row_ref = $1 RETURNING {REQUEST_COLUMNS}",
                active_table_name(from)
            );
            let source = sqlx::query(&sql)
                .bind(row.value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| database_error(&e))?;

            let Some(source) = source else {
                let _ = tx.rollback().await; // Ignore rollback errors
                return Ok(None);
            };

            let mut record = row_to_request(&source)?.into_record();
            record.updated_at = updated_at;
            // Dropping the transaction on error rolls the delete back.
            let moved = insert_request(&mut *tx, to, &record).await?;

            tx.commit()
                .await
                .map_err(|e| RecordStoreError::DatabaseError(format!("Failed to commit transaction: {e}")))?;
            Ok(Some(moved))
        })
    }

    fn registry_contains(&self, identifier: RegistrantId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM registry WHERE identifier = $1)",
            )
            .bind(identifier.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| database_error(&e))
        })
    }

    fn register(&self, identifier: RegistrantId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO registry (identifier) VALUES ($1) ON CONFLICT (identifier) DO NOTHING",
            )
            .bind(identifier.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;
            Ok(())
        })
    }
}
