//! Request lifecycle state machine.
//!
//! Where a request is in its lifecycle is encoded by which active tables hold a
//! row for its identifier. This module turns that membership into an explicit
//! [`RequestState`] through a single resolution function, and describes the
//! allowed administrative [`Transition`]s between tables.
//!
//! # Precedence
//!
//! Membership is probed as `Pending`, `PrintQueue`, `Accepted`, `Rejected`;
//! the first table holding the identifier wins. An identifier present in both
//! `Pending` and `Accepted` (a repeat request after pickup) therefore resolves
//! to [`RequestState::Pending`].
//!
//! ```
//! use idcard_workflow_core::state::{DerivedStatus, Presence, RequestState};
//!
//! let presence = Presence { pending: true, accepted: true, ..Presence::default() };
//! let state = RequestState::from_presence(presence);
//! assert_eq!(state, RequestState::Pending);
//! assert_eq!(state.view(presence).status, DerivedStatus::UnderReview);
//! ```

use crate::table::ActiveTable;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw membership flags for one identifier across the active tables.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Row exists in `Pending`.
    pub pending: bool,
    /// Row exists in `PrintQueue`.
    pub print_queue: bool,
    /// At least one row exists in `Accepted`.
    pub accepted: bool,
    /// Row exists in `Rejected`.
    pub rejected: bool,
}

impl Presence {
    /// Flag for a single table.
    #[must_use]
    pub const fn contains(self, table: ActiveTable) -> bool {
        match table {
            ActiveTable::Pending => self.pending,
            ActiveTable::PrintQueue => self.print_queue,
            ActiveTable::Accepted => self.accepted,
            ActiveTable::Rejected => self.rejected,
        }
    }
}

/// Explicit lifecycle state of a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Submitted, awaiting review.
    Pending,
    /// Approved, waiting to be printed.
    Queued,
    /// Printed and ready for pickup.
    Accepted,
    /// Rejected by an administrator.
    Rejected,
    /// No live request.
    None,
}

impl RequestState {
    /// Resolve membership flags to a state using the fixed table precedence.
    #[must_use]
    pub fn from_presence(presence: Presence) -> Self {
        ActiveTable::PRECEDENCE
            .into_iter()
            .find(|table| presence.contains(*table))
            .map_or(Self::None, Self::of_table)
    }

    /// State implied by living in `table`.
    #[must_use]
    pub const fn of_table(table: ActiveTable) -> Self {
        match table {
            ActiveTable::Pending => Self::Pending,
            ActiveTable::PrintQueue => Self::Queued,
            ActiveTable::Accepted => Self::Accepted,
            ActiveTable::Rejected => Self::Rejected,
        }
    }

    /// Active table a request in this state lives in.
    #[must_use]
    pub const fn table(self) -> Option<ActiveTable> {
        match self {
            Self::Pending => Some(ActiveTable::Pending),
            Self::Queued => Some(ActiveTable::PrintQueue),
            Self::Accepted => Some(ActiveTable::Accepted),
            Self::Rejected => Some(ActiveTable::Rejected),
            Self::None => None,
        }
    }

    /// Client-facing status label.
    #[must_use]
    pub const fn status(self) -> DerivedStatus {
        match self {
            Self::Pending => DerivedStatus::UnderReview,
            Self::Queued => DerivedStatus::ApprovedPrinting,
            Self::Accepted => DerivedStatus::ReadyPickup,
            Self::Rejected => DerivedStatus::Rejected,
            Self::None => DerivedStatus::None,
        }
    }

    /// Whether a new submission is allowed from this state.
    ///
    /// `Accepted` allows it so a registrant can request again after pickup.
    #[must_use]
    pub const fn accepts_submission(self) -> bool {
        matches!(self, Self::Accepted | Self::None)
    }

    /// Action label shown next to the submission form.
    #[must_use]
    pub const fn action_label(self) -> ActionLabel {
        match self {
            Self::Pending | Self::Queued => ActionLabel::AlreadySubmitted,
            Self::Rejected => ActionLabel::RequestRejected,
            Self::Accepted | Self::None => ActionLabel::SubmitRequest,
        }
    }

    /// Full status view for this state.
    #[must_use]
    pub const fn view(self, presence: Presence) -> StatusView {
        StatusView {
            status: self.status(),
            form_enabled: self.accepts_submission(),
            action_label: self.action_label(),
            presence,
        }
    }

    /// Validate `transition` from this state.
    ///
    /// Returns the `(from, to)` table pair the row must move between.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the transition does not start from
    /// this state.
    pub const fn apply(
        self,
        transition: Transition,
    ) -> Result<(ActiveTable, ActiveTable), InvalidTransition> {
        let (from, to) = transition.tables();
        if matches!(
            (self, transition),
            (Self::Pending, Transition::Approve | Transition::Reject)
                | (Self::Queued, Transition::MarkPrinted)
        ) {
            Ok((from, to))
        } else {
            Err(InvalidTransition {
                state: self,
                transition,
            })
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Administrative move of a request between active tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// `Pending` → `PrintQueue`.
    Approve,
    /// `PrintQueue` → `Accepted`.
    MarkPrinted,
    /// `Pending` → `Rejected`.
    Reject,
}

impl Transition {
    /// Source and destination tables.
    #[must_use]
    pub const fn tables(self) -> (ActiveTable, ActiveTable) {
        match self {
            Self::Approve => (ActiveTable::Pending, ActiveTable::PrintQueue),
            Self::MarkPrinted => (ActiveTable::PrintQueue, ActiveTable::Accepted),
            Self::Reject => (ActiveTable::Pending, ActiveTable::Rejected),
        }
    }

    /// Stable name for logs and metrics labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::MarkPrinted => "mark_printed",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition attempted from a state it does not start from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot {transition} a request in state {state}")]
pub struct InvalidTransition {
    /// State the request was in.
    pub state: RequestState,
    /// Transition that was attempted.
    pub transition: Transition,
}

/// Lifecycle status label rendered by clients.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivedStatus {
    /// Request is in `Pending`.
    UnderReview,
    /// Request is in `PrintQueue`.
    ApprovedPrinting,
    /// Request is in `Accepted`.
    ReadyPickup,
    /// Request is in `Rejected`.
    Rejected,
    /// No live request.
    None,
}

impl DerivedStatus {
    /// Wire label, e.g. `"under-review"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnderReview => "under-review",
            Self::ApprovedPrinting => "approved-printing",
            Self::ReadyPickup => "ready-pickup",
            Self::Rejected => "rejected",
            Self::None => "none",
        }
    }
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label on the submission form's action button.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionLabel {
    /// A request is already in flight.
    #[serde(rename = "already submitted")]
    AlreadySubmitted,
    /// A new request may be submitted.
    #[serde(rename = "submit request")]
    SubmitRequest,
    /// The last request was rejected.
    #[serde(rename = "request rejected")]
    RequestRejected,
}

impl ActionLabel {
    /// Display text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadySubmitted => "already submitted",
            Self::SubmitRequest => "submit request",
            Self::RequestRejected => "request rejected",
        }
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved status of an identifier, as returned to clients.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    /// Derived lifecycle status.
    pub status: DerivedStatus,
    /// Whether the submission form is enabled.
    pub form_enabled: bool,
    /// Label for the form's action.
    pub action_label: ActionLabel,
    /// Raw membership flags.
    pub presence: Presence,
}
