//! # ID Card Workflow Core
//!
//! Core types and traits for tracking an identity-card request from submission
//! through approval or rejection to archival.
//!
//! ## Core Concepts
//!
//! - **Active tables**: `Pending`, `PrintQueue`, `Accepted`, `Rejected`
//! - **History tables**: append-only archives of accepted and rejected rows
//! - **Record store**: persistence contract over those tables ([`record_store::RecordStore`])
//! - **Request state**: lifecycle state derived from table membership ([`state::RequestState`])
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//!
//! ## Example
//!
//! ```
//! use idcard_workflow_core::state::{DerivedStatus, Presence, RequestState};
//!
//! let presence = Presence { print_queue: true, ..Presence::default() };
//! let view = RequestState::from_presence(presence).view(presence);
//! assert_eq!(view.status, DerivedStatus::ApprovedPrinting);
//! assert!(!view.form_enabled);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod error;
pub mod record;
pub mod record_store;
pub mod registrant;
pub mod state;
pub mod table;

pub use error::WorkflowError;
pub use record::{Attachment, HistoryRecord, HolderAttributes, NewRequest, RequestRecord, Stored};
pub use record_store::{ArchiveOutcome, RecordStore, RecordStoreError};
pub use registrant::{RegistrantId, RowRef};
pub use state::{DerivedStatus, Presence, RequestState, StatusView, Transition};
pub use table::{ActiveTable, HistoryTable};

/// Environment module - Dependency injection traits
///
/// All external dependencies other than storage are abstracted behind traits
/// and injected into the workflow service.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use idcard_workflow_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock reading the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
