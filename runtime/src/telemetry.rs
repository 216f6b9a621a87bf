//! Metric names emitted by the workflow service.
//!
//! The service records through the `metrics` facade; installing an exporter is
//! left to the hosting process. Call [`register_metrics`] once at startup to
//! attach descriptions.

use metrics::{Unit, describe_counter};

/// Requests accepted into `Pending`.
pub const REQUESTS_SUBMITTED: &str = "idcard.requests.submitted";

/// Submissions or moves refused because the identifier was already present.
pub const REQUESTS_CONFLICTS: &str = "idcard.requests.conflicts";

/// Active rows moved into a history table.
pub const TRANSFER_ARCHIVED: &str = "idcard.transfer.archived";

/// Active rows whose archival failed.
pub const TRANSFER_FAILED: &str = "idcard.transfer.failed";

/// Administrative transitions applied.
pub const TRANSITIONS: &str = "idcard.transitions";

/// Register descriptions for every workflow metric.
pub fn register_metrics() {
    describe_counter!(
        REQUESTS_SUBMITTED,
        Unit::Count,
        "Requests accepted into the pending table"
    );
    describe_counter!(
        REQUESTS_CONFLICTS,
        Unit::Count,
        "Writes refused because the identifier already had a live request"
    );
    describe_counter!(
        TRANSFER_ARCHIVED,
        Unit::Count,
        "Rows archived into history, labelled by provenance"
    );
    describe_counter!(
        TRANSFER_FAILED,
        Unit::Count,
        "Rows whose archival failed, labelled by provenance"
    );
    describe_counter!(
        TRANSITIONS,
        Unit::Count,
        "Administrative transitions, labelled by transition"
    );
}
