//! # ID Card Workflow Testing
//!
//! Testing utilities and helpers for the ID card workflow.
//!
//! This crate provides:
//! - In-memory implementations of the [`RecordStore`](idcard_workflow_core::RecordStore) trait
//! - Deterministic clocks
//! - Fixture builders for requests
//!
//! ## Example
//!
//! ```ignore
//! use idcard_workflow_testing::{InMemoryRecordStore, fixtures, test_clock};
//! use idcard_workflow_runtime::WorkflowService;
//!
//! #[tokio::test]
//! async fn submit_then_resolve() {
//!     let service = WorkflowService::new(
//!         Arc::new(InMemoryRecordStore::new()),
//!         Arc::new(test_clock()),
//!     );
//!     service.submit_request(fixtures::request("21CS001")).await?;
//!     let view = service.resolve_status(&"21CS001".into()).await?;
//!     assert_eq!(view.status, DerivedStatus::UnderReview);
//! }
//! ```

use chrono::{DateTime, Utc};
use idcard_workflow_core::environment::Clock;

pub mod record_mocks;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use idcard_workflow_testing::mocks::FixedClock;
    /// use idcard_workflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that moves forward by a fixed step on every reading
    ///
    /// Gives each row a distinct timestamp so newest-first ordering is
    /// observable in tests.
    ///
    /// ```
    /// use idcard_workflow_testing::mocks::SteppingClock;
    /// use idcard_workflow_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = SteppingClock::new(Utc::now(), Duration::seconds(1));
    /// let first = clock.now();
    /// assert_eq!(clock.now() - first, Duration::seconds(1));
    /// ```
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per reading
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = match self.next.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_089))
    }
}

/// Fixture builders for requests.
pub mod fixtures {
    use chrono::NaiveDate;
    use idcard_workflow_core::record::{Attachment, HolderAttributes, NewRequest};
    use idcard_workflow_core::registrant::RegistrantId;

    /// A fully populated submission for `identifier`.
    #[must_use]
    pub fn request(identifier: &str) -> NewRequest {
        NewRequest {
            identifier: RegistrantId::new(identifier),
            holder: HolderAttributes {
                name: format!("Holder {identifier}"),
                date_of_birth: NaiveDate::from_ymd_opt(2003, 6, 14),
                department: "CSE".to_string(),
                year: "III".to_string(),
                section: "A".to_string(),
                library_code: format!("LIB-{identifier}"),
            },
            reason: "Lost card".to_string(),
            attachment: None,
        }
    }

    /// Like [`request`], with a small PNG attachment.
    #[must_use]
    pub fn request_with_attachment(identifier: &str) -> NewRequest {
        NewRequest {
            attachment: Some(Attachment {
                media_type: "image/png".to_string(),
                filename: "complaint.png".to_string(),
                data: Some(vec![0x89, b'P', b'N', b'G']),
            }),
            ..request(identifier)
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, SteppingClock, test_clock};
pub use record_mocks::{FlakyRecordStore, InMemoryRecordStore};
