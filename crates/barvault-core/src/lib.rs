//! Core contracts for barvault.
//!
//! This crate contains:
//! - Bar domain model and validation of raw fetched rows
//! - The fetch capability and bar store contracts, plus an in-memory store
//! - Incremental sync coordination with a shared rate limiter
//! - Weekly/monthly aggregation of daily bars

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod throttling;
pub mod validation;

pub use aggregate::Aggregator;
pub use config::{AggregatorConfig, SyncConfig};
pub use domain::{AggregationPeriod, Bar, BarSeries, Symbol, MAX_VOLUME};
pub use error::{AggregateError, CoreError, StoreError, ValidationError};
pub use fetch::{BarFetcher, FetchError, FetchErrorKind, FetchFuture, FetchRequest};
pub use store::{prepare_batch, BarStore, MemoryBarStore, SymbolSummary, WriterLocks};
pub use sync::{
    CancelToken, CycleStats, FailureStage, SymbolFailure, SymbolReport, SyncCoordinator,
    SyncScheduler, SyncState,
};
pub use telemetry::init_tracing;
pub use throttling::FetchThrottle;
pub use validation::{BarValidator, RawBarRow, RejectionReason};
