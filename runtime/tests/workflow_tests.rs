//! Integration tests for the workflow service against the in-memory store.
//!
//! Covers status resolution precedence, submission conflicts, lifecycle
//! transitions, and the transfer engine's archival and retry behavior.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::{DateTime, Duration, Utc};
use idcard_workflow_core::environment::Clock;
use idcard_workflow_core::record::{HistoryRecord, RequestPatch, RequestRecord, Stored};
use idcard_workflow_core::record_store::{ArchiveOutcome, RecordStore, StoreFuture};
use idcard_workflow_core::registrant::RowRef;
use idcard_workflow_core::state::{ActionLabel, DerivedStatus, RequestState, Transition};
use idcard_workflow_core::table::{ActiveTable, HistoryTable};
use idcard_workflow_core::{NewRequest, RegistrantId, WorkflowError};
use idcard_workflow_runtime::{TransferReceipt, WorkflowConfig, WorkflowService};
use idcard_workflow_testing::{
    FlakyRecordStore, InMemoryRecordStore, SteppingClock, fixtures, test_clock,
};
use std::sync::Arc;
use tokio::sync::Barrier;

fn id(value: &str) -> RegistrantId {
    RegistrantId::new(value)
}

fn service_with(store: &InMemoryRecordStore) -> WorkflowService {
    let clock = SteppingClock::new(test_clock().now(), Duration::seconds(1));
    WorkflowService::new(Arc::new(store.clone()), Arc::new(clock))
}

async fn seed(store: &InMemoryRecordStore, table: ActiveTable, identifier: &str) {
    let record = RequestRecord::submitted(fixtures::request(identifier), test_clock().now());
    store.insert(table, record).await.expect("seed insert");
}

#[tokio::test]
async fn single_table_membership_maps_to_status() {
    let cases = [
        (ActiveTable::Pending, DerivedStatus::UnderReview, false, ActionLabel::AlreadySubmitted),
        (ActiveTable::PrintQueue, DerivedStatus::ApprovedPrinting, false, ActionLabel::AlreadySubmitted),
        (ActiveTable::Accepted, DerivedStatus::ReadyPickup, true, ActionLabel::SubmitRequest),
        (ActiveTable::Rejected, DerivedStatus::Rejected, false, ActionLabel::RequestRejected),
    ];

    for (table, status, form_enabled, label) in cases {
        let store = InMemoryRecordStore::new();
        seed(&store, table, "21CS001").await;
        let service = service_with(&store);

        let view = service.resolve_status(&id("21CS001")).await.unwrap();
        assert_eq!(view.status, status, "status for {table}");
        assert_eq!(view.form_enabled, form_enabled, "form for {table}");
        assert_eq!(view.action_label, label, "label for {table}");
        assert!(view.presence.contains(table));
    }
}

#[tokio::test]
async fn pending_wins_over_accepted() {
    let store = InMemoryRecordStore::new();
    seed(&store, ActiveTable::Pending, "21CS001").await;
    seed(&store, ActiveTable::Accepted, "21CS001").await;
    let service = service_with(&store);

    let view = service.resolve_status(&id("21CS001")).await.unwrap();
    assert_eq!(view.status, DerivedStatus::UnderReview);
    assert!(!view.form_enabled);
    assert!(view.presence.pending && view.presence.accepted);
}

#[tokio::test]
async fn unknown_identifier_resolves_to_none() {
    let service = service_with(&InMemoryRecordStore::new());

    let view = service.resolve_status(&id("21CS999")).await.unwrap();
    assert_eq!(view.status, DerivedStatus::None);
    assert!(view.form_enabled);
    assert_eq!(view.action_label, ActionLabel::SubmitRequest);
}

#[tokio::test]
async fn submit_then_get_and_duplicate_conflicts() {
    let service = service_with(&InMemoryRecordStore::new());

    let submitted = service
        .submit_request(fixtures::request_with_attachment("21CS001"))
        .await
        .unwrap();
    assert_eq!(submitted.status, "pending");

    let fetched = service.get_request(&id("21CS001")).await.unwrap();
    assert_eq!(fetched, submitted);
    assert!(fetched.attachment.and_then(|a| a.data).is_some());

    let err = service
        .submit_request(fixtures::request("21CS001"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Conflict {
            table: ActiveTable::Pending,
            ..
        }
    ));
    assert_eq!(err.user_message(), "A request for 21CS001 already exists");
}

#[tokio::test]
async fn submit_requires_identifier_and_name() {
    let service = service_with(&InMemoryRecordStore::new());

    let err = service
        .submit_request(NewRequest::new("21CS001", "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let err = service.submit_request(NewRequest::new("", "A")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn submit_refused_while_queued_or_rejected() {
    for table in [ActiveTable::PrintQueue, ActiveTable::Rejected] {
        let store = InMemoryRecordStore::new();
        seed(&store, table, "21CS001").await;
        let service = service_with(&store);

        let err = service
            .submit_request(fixtures::request("21CS001"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, WorkflowError::Conflict { table: t, .. } if t == table),
            "expected conflict on {table}, got {err:?}"
        );
        assert_eq!(store.active_len(ActiveTable::Pending), 0);
    }
}

#[tokio::test]
async fn resubmission_allowed_after_acceptance() {
    let store = InMemoryRecordStore::new();
    seed(&store, ActiveTable::Accepted, "21CS001").await;
    let service = service_with(&store);

    service.submit_request(fixtures::request("21CS001")).await.unwrap();
    let view = service.resolve_status(&id("21CS001")).await.unwrap();
    assert_eq!(view.status, DerivedStatus::UnderReview);
}

#[tokio::test]
async fn list_requests_omits_attachment_bytes() {
    let service = service_with(&InMemoryRecordStore::new());
    service
        .submit_request(fixtures::request_with_attachment("21CS001"))
        .await
        .unwrap();
    service.submit_request(fixtures::request("21CS002")).await.unwrap();

    let listed = service.list_requests().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].identifier, id("21CS002"));

    let attachment = listed[1].attachment.clone().expect("metadata kept");
    assert_eq!(attachment.filename, "complaint.png");
    assert!(attachment.data.is_none());
}

#[tokio::test]
async fn set_status_annotates_pending_row_in_place() {
    let store = InMemoryRecordStore::new();
    let service = service_with(&store);
    let submitted = service.submit_request(fixtures::request("21CS001")).await.unwrap();

    let updated = service.set_status(&id("21CS001"), "documents verified").await.unwrap();
    assert_eq!(updated.status, "documents verified");
    assert!(updated.updated_at > submitted.updated_at);
    assert_eq!(updated.created_at, submitted.created_at);
    assert_eq!(store.active_len(ActiveTable::Pending), 1);

    let view = service.resolve_status(&id("21CS001")).await.unwrap();
    assert_eq!(view.status, DerivedStatus::UnderReview);

    let err = service.set_status(&id("21CS404"), "verified").await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { table: ActiveTable::Pending, .. }));

    let err = service.set_status(&id("21CS001"), " ").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn get_request_missing_is_not_found() {
    let service = service_with(&InMemoryRecordStore::new());
    let err = service.get_request(&id("21CS001")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }));
}

#[tokio::test]
async fn membership_checks() {
    let store = InMemoryRecordStore::new();
    seed(&store, ActiveTable::PrintQueue, "21CS001").await;
    seed(&store, ActiveTable::Accepted, "21CS002").await;
    seed(&store, ActiveTable::Rejected, "21CS003").await;
    let service = service_with(&store);

    assert!(service.is_queued(&id("21CS001")).await.unwrap());
    assert!(!service.is_accepted(&id("21CS001")).await.unwrap());
    assert!(service.is_accepted(&id("21CS002")).await.unwrap());
    assert!(service.is_rejected(&id("21CS003")).await.unwrap());
    assert!(!service.is_rejected(&id("21CS002")).await.unwrap());
}

#[tokio::test]
async fn registry_round_trip() {
    let service = service_with(&InMemoryRecordStore::new());
    assert!(!service.registry_contains(&id("21CS001")).await.unwrap());
    service.register(&id("21CS001")).await.unwrap();
    assert!(service.registry_contains(&id("21CS001")).await.unwrap());

    let err = service.register(&id("   ")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn approve_print_then_pickup_example() {
    let store = InMemoryRecordStore::new();
    let service = service_with(&store);

    service.submit_request(NewRequest::new("21CS001", "A")).await.unwrap();
    assert_eq!(
        service.resolve_status(&id("21CS001")).await.unwrap().status,
        DerivedStatus::UnderReview
    );

    service.advance(&id("21CS001"), Transition::Approve).await.unwrap();
    assert_eq!(
        service.resolve_status(&id("21CS001")).await.unwrap().status,
        DerivedStatus::ApprovedPrinting
    );

    service.advance(&id("21CS001"), Transition::MarkPrinted).await.unwrap();
    assert_eq!(
        service.resolve_status(&id("21CS001")).await.unwrap().status,
        DerivedStatus::ReadyPickup
    );
    assert_eq!(store.active_len(ActiveTable::Pending), 0);
    assert_eq!(store.active_len(ActiveTable::PrintQueue), 0);

    let moved = service.transfer_accepted_to_history(&id("21CS001")).await.unwrap();
    assert_eq!(moved, 1);
    assert!(service.list_accepted_for(&id("21CS001")).await.unwrap().is_empty());
    let history = service.list_accepted_history_for(&id("21CS001")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].provenance, ActiveTable::Accepted);
    assert_eq!(
        service.resolve_status(&id("21CS001")).await.unwrap().status,
        DerivedStatus::None
    );
}

#[tokio::test]
async fn invalid_transitions_are_refused_without_side_effects() {
    let store = InMemoryRecordStore::new();
    let service = service_with(&store);
    service.submit_request(fixtures::request("21CS001")).await.unwrap();

    let err = service
        .advance(&id("21CS001"), Transition::MarkPrinted)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidTransition {
            state: RequestState::Pending,
            transition: Transition::MarkPrinted,
            ..
        }
    ));
    assert_eq!(store.active_len(ActiveTable::Pending), 1);

    let err = service
        .advance(&id("21CS404"), Transition::Approve)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::InvalidTransition {
            state: RequestState::None,
            ..
        }
    ));
}

#[tokio::test]
async fn reject_then_archive_rejected() {
    let store = InMemoryRecordStore::new();
    let service = service_with(&store);
    service.submit_request(fixtures::request("21CS001")).await.unwrap();
    service.advance(&id("21CS001"), Transition::Reject).await.unwrap();
    assert!(service.is_rejected(&id("21CS001")).await.unwrap());

    let receipt = service.transfer_rejected_to_history(&id("21CS001")).await.unwrap();
    assert_eq!(
        receipt,
        TransferReceipt {
            success: true,
            count: 1
        }
    );
    assert!(!service.is_rejected(&id("21CS001")).await.unwrap());

    let history = service.list_rejected_history_for(&id("21CS001")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].provenance, ActiveTable::Rejected);

    let err = service
        .transfer_rejected_to_history(&id("21CS001"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { table: ActiveTable::Rejected, .. }));
}

#[tokio::test]
async fn rejected_transfer_on_absent_identifier_has_no_side_effects() {
    let store = InMemoryRecordStore::new();
    seed(&store, ActiveTable::Rejected, "21CS002").await;
    let service = service_with(&store);

    let err = service
        .transfer_rejected_to_history(&id("21CS001"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }));
    assert_eq!(store.active_len(ActiveTable::Rejected), 1);
    assert_eq!(store.history_len(HistoryTable::RejectedHistory), 0);
}

#[tokio::test]
async fn accepted_transfer_archives_every_row_once() {
    let store = InMemoryRecordStore::new();
    seed(&store, ActiveTable::Accepted, "21CS001").await;
    seed(&store, ActiveTable::Accepted, "21CS001").await;
    seed(&store, ActiveTable::Accepted, "21CS002").await;
    let service = service_with(&store);

    let moved = service.transfer_accepted_to_history(&id("21CS001")).await.unwrap();
    assert_eq!(moved, 2);
    assert!(service.list_accepted_for(&id("21CS001")).await.unwrap().is_empty());
    assert_eq!(service.list_accepted_for(&id("21CS002")).await.unwrap().len(), 1);

    let history = service.list_accepted_history_for(&id("21CS001")).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.provenance == ActiveTable::Accepted));
    assert_ne!(history[0].source_row, history[1].source_row);

    let err = service
        .transfer_accepted_to_history(&id("21CS001"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { table: ActiveTable::Accepted, .. }));
}

#[tokio::test]
async fn history_copies_attributes_and_stamps_archive_time() {
    let store = InMemoryRecordStore::new();
    let service = service_with(&store);
    let submitted = service.submit_request(fixtures::request("21CS001")).await.unwrap();
    service.advance(&id("21CS001"), Transition::Approve).await.unwrap();
    service.advance(&id("21CS001"), Transition::MarkPrinted).await.unwrap();

    service.transfer_accepted_to_history(&id("21CS001")).await.unwrap();
    let history = service.list_accepted_history_for(&id("21CS001")).await.unwrap();
    let entry = &history[0];

    assert_eq!(entry.identifier, submitted.identifier);
    assert_eq!(entry.holder, submitted.holder);
    assert_eq!(entry.reason, submitted.reason);
    assert_eq!(entry.created_at, submitted.created_at);
    assert!(entry.archived_at >= entry.created_at);
}

#[tokio::test]
async fn archive_time_never_precedes_creation() {
    // Clock far behind the seeded row's creation time.
    let store = InMemoryRecordStore::new();
    seed(&store, ActiveTable::Accepted, "21CS001").await;
    let lagging = idcard_workflow_testing::FixedClock::new(test_clock().now() - Duration::days(1));
    let service = WorkflowService::new(Arc::new(store.clone()), Arc::new(lagging));

    service.transfer_accepted_to_history(&id("21CS001")).await.unwrap();
    let history = service.list_accepted_history_for(&id("21CS001")).await.unwrap();
    assert_eq!(history[0].archived_at, history[0].created_at);
}

#[tokio::test]
async fn interrupted_transfer_is_completed_without_duplicates() {
    let flaky = Arc::new(FlakyRecordStore::new(InMemoryRecordStore::new()));
    for _ in 0..3 {
        let record = RequestRecord::submitted(fixtures::request("21CS001"), test_clock().now());
        flaky.insert(ActiveTable::Accepted, record).await.unwrap();
    }
    let service = WorkflowService::with_config(
        flaky.clone(),
        Arc::new(test_clock()),
        WorkflowConfig::new(2),
    );

    flaky.fail_next_deletes(1);
    let err = service
        .transfer_accepted_to_history(&id("21CS001"))
        .await
        .unwrap_err();
    assert!(err.is_store_failure());
    assert_eq!(flaky.inner().active_len(ActiveTable::Accepted), 1);
    assert_eq!(flaky.inner().history_len(HistoryTable::AcceptedHistory), 3);

    let moved = service.transfer_accepted_to_history(&id("21CS001")).await.unwrap();
    assert_eq!(moved, 1);
    assert_eq!(flaky.inner().active_len(ActiveTable::Accepted), 0);
    assert_eq!(flaky.inner().history_len(HistoryTable::AcceptedHistory), 3);
}

#[tokio::test]
async fn failed_history_append_keeps_source_row() {
    let flaky = Arc::new(FlakyRecordStore::new(InMemoryRecordStore::new()));
    let record = RequestRecord::submitted(fixtures::request("21CS001"), test_clock().now());
    flaky.insert(ActiveTable::Rejected, record).await.unwrap();
    let service = WorkflowService::new(flaky.clone(), Arc::new(test_clock()));

    flaky.fail_next_appends(1);
    let err = service
        .transfer_rejected_to_history(&id("21CS001"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Store(_)));
    assert_eq!(flaky.inner().active_len(ActiveTable::Rejected), 1);
    assert_eq!(flaky.inner().history_len(HistoryTable::RejectedHistory), 0);

    service.transfer_rejected_to_history(&id("21CS001")).await.unwrap();
    assert_eq!(flaky.inner().history_len(HistoryTable::RejectedHistory), 1);
}

/// Store that parks selected calls on a barrier so two requests reach the
/// same point before either continues.
struct GatedStore {
    inner: InMemoryRecordStore,
    submit_gate: Option<Barrier>,
    find_many_gate: Option<Barrier>,
}

impl GatedStore {
    fn new(inner: InMemoryRecordStore) -> Self {
        Self {
            inner,
            submit_gate: None,
            find_many_gate: None,
        }
    }

    /// Hold every `submit` until `parties` callers are waiting.
    fn gate_submissions(mut self, parties: usize) -> Self {
        self.submit_gate = Some(Barrier::new(parties));
        self
    }

    /// Return `find_many` results only once `parties` callers have read.
    fn gate_find_many(mut self, parties: usize) -> Self {
        self.find_many_gate = Some(Barrier::new(parties));
        self
    }
}

impl RecordStore for GatedStore {
    fn insert(&self, table: ActiveTable, record: RequestRecord) -> StoreFuture<'_, Stored<RequestRecord>> {
        self.inner.insert(table, record)
    }

    fn submit(&self, record: RequestRecord) -> StoreFuture<'_, Stored<RequestRecord>> {
        Box::pin(async move {
            if let Some(gate) = &self.submit_gate {
                gate.wait().await;
            }
            self.inner.submit(record).await
        })
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
        Box::pin(async move {
            let rows = self.inner.find_many(table, identifier).await?;
            if let Some(gate) = &self.find_many_gate {
                gate.wait().await;
            }
            Ok(rows)
        })
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
        self.inner.delete(table, row)
    }

    fn append_history(&self, table: HistoryTable, entry: HistoryRecord) -> StoreFuture<'_, ArchiveOutcome> {
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

#[tokio::test]
async fn racing_submissions_meet_at_the_store_and_one_conflicts() {
    let store = InMemoryRecordStore::new();
    let gated = GatedStore::new(store.clone()).gate_submissions(2);
    let service = WorkflowService::new(Arc::new(gated), Arc::new(test_clock()));

    // Both calls are parked inside the store before either writes.
    let (a, b) = tokio::join!(
        service.submit_request(fixtures::request("21CS001")),
        service.submit_request(fixtures::request("21CS001")),
    );
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(WorkflowError::Conflict {
            table: ActiveTable::Pending,
            ..
        })
    )));
    assert_eq!(store.active_len(ActiveTable::Pending), 1);
}

#[tokio::test]
async fn rejection_landing_mid_submission_blocks_the_write() {
    let store = InMemoryRecordStore::new();
    seed(&store, ActiveTable::Pending, "21CS001").await;
    let gated = Arc::new(GatedStore::new(store.clone()).gate_submissions(2));
    let service = WorkflowService::new(gated.clone(), Arc::new(test_clock()));

    // The submission waits inside the store while the rejection commits.
    let (submitted, rejected) = tokio::join!(
        service.submit_request(fixtures::request("21CS001")),
        async {
            let moved = service.advance(&id("21CS001"), Transition::Reject).await;
            if let Some(gate) = &gated.submit_gate {
                gate.wait().await;
            }
            moved
        },
    );
    rejected.unwrap();
    let err = submitted.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Conflict {
            table: ActiveTable::Rejected,
            ..
        }
    ));
    assert_eq!(store.active_len(ActiveTable::Pending), 0);
    assert_eq!(store.active_len(ActiveTable::Rejected), 1);
}

#[tokio::test]
async fn padded_identifier_is_refused_before_reaching_the_store() {
    let store = InMemoryRecordStore::new();
    let service = service_with(&store);

    let err = service
        .submit_request(fixtures::request(" 21CS001 "))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    assert_eq!(store.active_len(ActiveTable::Pending), 0);

    let err = service.register(&id("21CS001 ")).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
}

#[tokio::test]
async fn overlapping_transfers_count_each_row_once() {
    let store = InMemoryRecordStore::new();
    for _ in 0..3 {
        seed(&store, ActiveTable::Accepted, "21CS001").await;
    }
    let gated = GatedStore::new(store.clone()).gate_find_many(2);
    let service = WorkflowService::new(Arc::new(gated), Arc::new(test_clock()));

    // Both transfers list the same three rows before either archives.
    let id_a = id("21CS001");
    let id_b = id("21CS001");
    let (a, b) = tokio::join!(
        service.transfer_accepted_to_history(&id_a),
        service.transfer_accepted_to_history(&id_b),
    );
    assert_eq!(a.unwrap() + b.unwrap(), 3);
    assert_eq!(store.active_len(ActiveTable::Accepted), 0);
    assert_eq!(store.history_len(HistoryTable::AcceptedHistory), 3);
}
