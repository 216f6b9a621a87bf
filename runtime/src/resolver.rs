//! Status resolution.
//!
//! A registrant's status is never stored; it is derived from which active
//! tables currently hold the identifier. The four membership probes are
//! independent reads and run concurrently.

use crate::service::{WorkflowService, store_failure};
use idcard_workflow_core::registrant::RegistrantId;
use idcard_workflow_core::state::{Presence, RequestState, StatusView};
use idcard_workflow_core::table::ActiveTable;
use idcard_workflow_core::WorkflowError;

impl WorkflowService {
    /// Which active tables currently hold `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if any probe fails.
    pub async fn presence(&self, identifier: &RegistrantId) -> Result<Presence, WorkflowError> {
        let probe = |table: ActiveTable| {
            let store = &self.store;
            let identifier = identifier.clone();
            async move {
                store
                    .find_one(table, identifier)
                    .await
                    .map(|row| row.is_some())
            }
        };

        let (pending, print_queue, accepted, rejected) = futures::try_join!(
            probe(ActiveTable::Pending),
            probe(ActiveTable::PrintQueue),
            probe(ActiveTable::Accepted),
            probe(ActiveTable::Rejected),
        )
        .map_err(|e| store_failure("presence", e))?;

        Ok(Presence {
            pending,
            print_queue,
            accepted,
            rejected,
        })
    }

    /// The lifecycle state of `identifier`'s request.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if any probe fails.
    pub async fn resolve_state(&self, identifier: &RegistrantId) -> Result<RequestState, WorkflowError> {
        let presence = self.presence(identifier).await?;
        Ok(RequestState::from_presence(presence))
    }

    /// Derived status, form availability and action label for `identifier`.
    ///
    /// When several tables hold the identifier the first in precedence order
    /// wins: `Pending`, `PrintQueue`, `Accepted`, then `Rejected`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] if any probe fails.
    #[tracing::instrument(skip_all, fields(identifier = %identifier))]
    pub async fn resolve_status(&self, identifier: &RegistrantId) -> Result<StatusView, WorkflowError> {
        let presence = self.presence(identifier).await?;
        let view = RequestState::from_presence(presence).view(presence);
        tracing::debug!(status = %view.status, form_enabled = view.form_enabled, "Status resolved");
        Ok(view)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use idcard_workflow_core::environment::Clock;
    use idcard_workflow_core::record::RequestRecord;
    use idcard_workflow_core::record_store::RecordStore;
    use idcard_workflow_core::state::DerivedStatus;
    use idcard_workflow_testing::{InMemoryRecordStore, fixtures, test_clock};
    use std::sync::Arc;

    #[tokio::test]
    async fn presence_reports_every_table() {
        let store = Arc::new(InMemoryRecordStore::new());
        let clock = test_clock();
        for table in [ActiveTable::PrintQueue, ActiveTable::Rejected] {
            store
                .insert(table, RequestRecord::submitted(fixtures::request("21CS001"), clock.now()))
                .await
                .unwrap();
        }
        let service = WorkflowService::new(store, Arc::new(clock));

        let presence = service.presence(&RegistrantId::new("21CS001")).await.unwrap();
        assert_eq!(
            presence,
            Presence {
                pending: false,
                print_queue: true,
                accepted: false,
                rejected: true,
            }
        );

        let view = service.resolve_status(&RegistrantId::new("21CS001")).await.unwrap();
        assert_eq!(view.status, DerivedStatus::ApprovedPrinting);
        assert!(!view.form_enabled);
    }
}
