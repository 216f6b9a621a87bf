//! `PostgreSQL` record store for the ID card workflow.
//!
//! This crate provides a PostgreSQL-based implementation of the `RecordStore`
//! trait from `idcard-workflow-core`. It uses sqlx and supports:
//!
//! - Unique-index enforcement of one live row per identifier
//! - Transactional archival and relocation between tables
//! - Idempotent history appends keyed on the source row
//! - Connection pooling and embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use idcard_workflow_postgres::{PostgresConfig, PostgresRecordStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresRecordStore::connect(&PostgresConfig::from_env()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Connection settings
pub mod config;

/// The `RecordStore` implementation
pub mod record_store;

pub use config::PostgresConfig;
pub use record_store::PostgresRecordStore;
