//! Runtime configuration for the workflow service.
//!
//! Loads from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Default number of accepted rows archived concurrently.
pub const DEFAULT_TRANSFER_CONCURRENCY: usize = 8;

/// Workflow service configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Upper bound on concurrent archive operations within one accept-side
    /// transfer. Always at least 1.
    pub transfer_concurrency: usize,
}

impl WorkflowConfig {
    /// Create a configuration with the given fan-out limit.
    #[must_use]
    pub const fn new(transfer_concurrency: usize) -> Self {
        Self {
            transfer_concurrency: if transfer_concurrency == 0 {
                1
            } else {
                transfer_concurrency
            },
        }
    }

    /// Set the transfer fan-out limit.
    #[must_use]
    pub const fn with_transfer_concurrency(self, transfer_concurrency: usize) -> Self {
        Self::new(transfer_concurrency)
    }

    /// Load configuration from environment variables.
    ///
    /// - `IDCARD_TRANSFER_CONCURRENCY` (default: 8)
    ///
    /// Unparseable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            env::var("IDCARD_TRANSFER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TRANSFER_CONCURRENCY),
        )
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSFER_CONCURRENCY)
    }
}
