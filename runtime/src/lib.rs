//! # ID Card Workflow Runtime
//!
//! The workflow service behind the request gateway.
//!
//! This crate wires a [`RecordStore`](idcard_workflow_core::RecordStore) and a
//! [`Clock`](idcard_workflow_core::environment::Clock) into a
//! [`WorkflowService`] exposing every gateway operation.
//!
//! ## Core Components
//!
//! - **Service**: submission, lookup, annotation and lifecycle transitions
//! - **Resolver**: derives a registrant's status from table membership
//! - **Transfer engine**: archives accepted and rejected rows into history
//!
//! ## Example
//!
//! ```ignore
//! use idcard_workflow_runtime::WorkflowService;
//! use idcard_workflow_core::{environment::SystemClock, NewRequest, Transition};
//!
//! let service = WorkflowService::new(store, Arc::new(SystemClock));
//!
//! service.submit_request(NewRequest::new("21CS001", "A")).await?;
//! service.advance(&"21CS001".into(), Transition::Approve).await?;
//! service.advance(&"21CS001".into(), Transition::MarkPrinted).await?;
//!
//! // Card picked up
//! let moved = service.transfer_accepted_to_history(&"21CS001".into()).await?;
//! ```

/// Service configuration
pub mod config;

/// Status resolution from table membership
pub mod resolver;

/// The workflow service and its gateway operations
pub mod service;

/// Metric names and descriptions
pub mod telemetry;

/// Archival of accepted and rejected rows
pub mod transfer;

pub use config::WorkflowConfig;
pub use service::WorkflowService;
pub use transfer::TransferReceipt;
