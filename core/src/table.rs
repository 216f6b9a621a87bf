//! Logical tables of the record store.
//!
//! The workflow keeps four *active* tables, whose combined membership encodes
//! where a request currently is, and two append-only *history* tables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four active tables holding live request rows.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveTable {
    /// Submitted requests awaiting administrative review.
    Pending,
    /// Approved requests waiting for the card to be printed.
    PrintQueue,
    /// Printed cards ready for pickup.
    Accepted,
    /// Rejected requests.
    Rejected,
}

impl ActiveTable {
    /// All active tables in status-resolution precedence order.
    pub const PRECEDENCE: [Self; 4] = [
        Self::Pending,
        Self::PrintQueue,
        Self::Accepted,
        Self::Rejected,
    ];

    /// Tables whose membership refuses a new submission, in precedence order.
    ///
    /// `Accepted` is absent: a registrant whose card is ready may request
    /// another.
    pub const SUBMISSION_BLOCKERS: [Self; 3] = [Self::Pending, Self::PrintQueue, Self::Rejected];

    /// Stable lowercase name, also used as the provenance tag on history rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PrintQueue => "print_queue",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a name produced by [`ActiveTable::as_str`].
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::PRECEDENCE.into_iter().find(|table| table.as_str() == name)
    }

    /// Whether the table rejects a second row for the same identifier.
    ///
    /// `Accepted` is the exception: a registrant may hold several accepted
    /// cards at once after repeated submission cycles.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        !matches!(self, Self::Accepted)
    }

    /// History table this table archives into, if any.
    #[must_use]
    pub const fn history(self) -> Option<HistoryTable> {
        match self {
            Self::Accepted => Some(HistoryTable::AcceptedHistory),
            Self::Rejected => Some(HistoryTable::RejectedHistory),
            Self::Pending | Self::PrintQueue => None,
        }
    }
}

impl fmt::Display for ActiveTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two append-only archive tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTable {
    /// Archive of rows taken from [`ActiveTable::Accepted`].
    AcceptedHistory,
    /// Archive of rows taken from [`ActiveTable::Rejected`].
    RejectedHistory,
}

impl HistoryTable {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AcceptedHistory => "accepted_history",
            Self::RejectedHistory => "rejected_history",
        }
    }

    /// The active table whose rows land here; its name is the provenance tag.
    #[must_use]
    pub const fn provenance(self) -> ActiveTable {
        match self {
            Self::AcceptedHistory => ActiveTable::Accepted,
            Self::RejectedHistory => ActiveTable::Rejected,
        }
    }
}

impl fmt::Display for HistoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_accepted_allows_duplicates() {
        assert!(ActiveTable::Pending.is_unique());
        assert!(ActiveTable::PrintQueue.is_unique());
        assert!(ActiveTable::Rejected.is_unique());
        assert!(!ActiveTable::Accepted.is_unique());
    }

    #[test]
    fn history_and_provenance_agree() {
        for table in ActiveTable::PRECEDENCE {
            if let Some(history) = table.history() {
                assert_eq!(history.provenance(), table);
            }
        }
        assert_eq!(HistoryTable::AcceptedHistory.provenance().as_str(), "accepted");
        assert_eq!(HistoryTable::RejectedHistory.provenance().as_str(), "rejected");
    }

    #[test]
    fn names_parse_back() {
        for table in ActiveTable::PRECEDENCE {
            assert_eq!(ActiveTable::parse(table.as_str()), Some(table));
        }
        assert_eq!(ActiveTable::parse("archived"), None);
    }
}
