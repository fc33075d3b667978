//! # turnstile-core
//!
//! Core logic for the turnstile access-control system: single-use access
//! codes are redeemed at the door, and every accepted redemption updates
//! an hourly entry/exit ledger and the roster of users currently inside.
//!
//! This crate provides:
//! - Exactly-once code redemption under concurrency
//! - Lossless hourly counters via optimistic transactions
//! - The live occupancy roster
//! - A pluggable document store with in-memory and file backends
//!
//! ## Architecture
//!
//! - [`store`] - Document store trait, backends, and the transactional [`StoreHandle`]
//! - [`codes`] - Access code validation and consumption
//! - [`stats`] - Hourly entry/exit statistics
//! - [`occupancy`] - Currently-present users
//! - [`orchestrator`] - One redemption end to end
//! - [`protocol`] - Line-oriented JSON result format
//! - [`scan`] - Scanner input normalization and debouncing
//! - [`config`] - Layered configuration
//! - [`retry`] - Backoff policy for conflicting transactions
//! - [`error`] - Unified error types
//! - [`types`] - Shared domain types
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use turnstile_core::{AccessCodeDoc, Collection, EventType, Orchestrator, StoreHandle};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), turnstile_core::StoreError> {
//! let store = StoreHandle::in_memory();
//! let expiry = Utc::now() + Duration::minutes(5);
//! store
//!     .set(Collection::AccessCodes, "ABC123", &AccessCodeDoc::new("u1", EventType::Enter, expiry))
//!     .await?;
//!
//! let orchestrator = Orchestrator::new(store);
//! assert!(orchestrator.process_code("ABC123").await.is_valid());
//! assert!(!orchestrator.process_code("ABC123").await.is_valid());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod codes;
pub mod config;
pub mod error;
pub mod occupancy;
pub mod orchestrator;
pub mod protocol;
pub mod retry;
pub mod scan;
pub mod stats;
pub mod store;
pub mod types;

// Re-export primary types for convenience
pub use codes::{code_hint, AccessCodeDoc, CodeRegistry};
pub use config::{
    default_config_path, default_data_dir, ConfigError, ConfigResult, DispatchMode, ScannerConfig,
    ServerConfig, StoreBackend, StoreConfig, SystemConfig, TurnstileConfig,
};
pub use error::{Result, TurnstileError};
pub use occupancy::{ExitSummary, OccupancyChange, OccupancyRecord, OccupancyTracker, WorkoutTags};
pub use orchestrator::{Orchestrator, Redemption};
pub use protocol::{ProtocolError, ResultReason, ValidationResponse};
pub use retry::RetryPolicy;
pub use scan::ScanDebouncer;
pub use stats::{HourlyStatsBucket, StatsAggregator};
pub use store::{
    Collection, DocumentStore, FileStore, MemoryStore, StoreError, StoreHandle, StoreResult,
};
pub use types::{EventType, HealthResponse, HourKey, Outcome, RejectReason};
