//! Request and history records.

use crate::error::WorkflowError;
use crate::registrant::{RegistrantId, RowRef};
use crate::table::ActiveTable;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Status label given to a freshly submitted request.
pub const DEFAULT_STATUS: &str = "pending";

/// Attributes of the card holder, printed on the card.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderAttributes {
    /// Full name.
    pub name: String,
    /// Date of birth, if supplied.
    pub date_of_birth: Option<NaiveDate>,
    /// Department, e.g. `"CSE"`.
    pub department: String,
    /// Year of study.
    pub year: String,
    /// Section within the year.
    pub section: String,
    /// Library membership code.
    pub library_code: String,
}

/// Supporting document uploaded with a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, e.g. `"image/jpeg"`.
    pub media_type: String,
    /// Filename as uploaded.
    pub filename: String,
    /// Raw bytes. `None` when omitted from a listing view.
    pub data: Option<Vec<u8>>,
}

impl Attachment {
    /// Copy of this attachment with the bytes dropped.
    #[must_use]
    pub fn without_data(&self) -> Self {
        Self {
            media_type: self.media_type.clone(),
            filename: self.filename.clone(),
            data: None,
        }
    }
}

/// Submission payload supplied by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Registrant submitting the request.
    pub identifier: RegistrantId,
    /// Holder attributes to print.
    pub holder: HolderAttributes,
    /// Why a new card is needed.
    pub reason: String,
    /// Optional supporting document.
    pub attachment: Option<Attachment>,
}

impl NewRequest {
    /// Minimal request carrying only an identifier and a holder name.
    #[must_use]
    pub fn new(identifier: impl Into<RegistrantId>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            holder: HolderAttributes {
                name: name.into(),
                ..HolderAttributes::default()
            },
            reason: String::new(),
            attachment: None,
        }
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Validation`] when the identifier is blank or
    /// padded with whitespace, or the holder name is blank.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.identifier.is_blank() {
            return Err(WorkflowError::Validation(
                "identifier is required".to_string(),
            ));
        }
        self.identifier
            .validate()
            .map_err(|e| WorkflowError::Validation(e.to_string()))?;
        if self.holder.name.trim().is_empty() {
            return Err(WorkflowError::Validation("name is required".to_string()));
        }
        Ok(())
    }
}

/// A request row in one of the active tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Registrant key.
    pub identifier: RegistrantId,
    /// Holder attributes.
    pub holder: HolderAttributes,
    /// Free-text reason.
    pub reason: String,
    /// Optional supporting document.
    pub attachment: Option<Attachment>,
    /// Free-text status label, annotated by administrators.
    pub status: String,
    /// When the request was first submitted.
    pub created_at: DateTime<Utc>,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl RequestRecord {
    /// Build a fresh record from a submission, stamped at `now`.
    #[must_use]
    pub fn submitted(request: NewRequest, now: DateTime<Utc>) -> Self {
        Self {
            identifier: request.identifier,
            holder: request.holder,
            reason: request.reason,
            attachment: request.attachment,
            status: DEFAULT_STATUS.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this record with attachment bytes omitted.
    #[must_use]
    pub fn without_attachment_data(&self) -> Self {
        Self {
            attachment: self.attachment.as_ref().map(Attachment::without_data),
            ..self.clone()
        }
    }
}

/// Partial update applied by [`crate::record_store::RecordStore::update`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestPatch {
    /// New status label, if changing.
    pub status: Option<String>,
    /// Timestamp to record as `updated_at`.
    pub updated_at: DateTime<Utc>,
}

impl RequestPatch {
    /// Patch that overwrites the status label.
    #[must_use]
    pub fn status(status: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status.into()),
            updated_at,
        }
    }

    /// Apply this patch to a record in place.
    pub fn apply(&self, record: &mut RequestRecord) {
        if let Some(status) = &self.status {
            record.status.clone_from(status);
        }
        record.updated_at = self.updated_at;
    }
}

/// Immutable archive entry copied from an accepted or rejected row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Registrant key. Not unique within a history table.
    pub identifier: RegistrantId,
    /// Holder attributes at the moment of archival.
    pub holder: HolderAttributes,
    /// Reason carried over from the source row.
    pub reason: String,
    /// Creation timestamp of the source row.
    pub created_at: DateTime<Utc>,
    /// When the row was archived.
    pub archived_at: DateTime<Utc>,
    /// Active table the row was archived from.
    pub provenance: ActiveTable,
    /// Row reference of the source row; unique per history table.
    pub source_row: RowRef,
}

impl HistoryRecord {
    /// Archive copy of `source`, taken from `provenance`.
    ///
    /// `archived_at` never precedes the source's creation time, even when
    /// the supplied clock reading does.
    #[must_use]
    pub fn archive_of(
        source: &Stored<RequestRecord>,
        provenance: ActiveTable,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: source.record.identifier.clone(),
            holder: source.record.holder.clone(),
            reason: source.record.reason.clone(),
            created_at: source.record.created_at,
            archived_at: now.max(source.record.created_at),
            provenance,
            source_row: source.row_ref,
        }
    }
}

/// A record together with the row reference the store assigned to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<T> {
    /// Internal row reference.
    pub row_ref: RowRef,
    /// Row contents.
    pub record: T,
}

impl<T> Stored<T> {
    /// Pair a record with its row reference.
    #[must_use]
    pub const fn new(row_ref: RowRef, record: T) -> Self {
        Self { row_ref, record }
    }

    /// Discard the row reference.
    #[must_use]
    pub fn into_record(self) -> T {
        self.record
    }
}
