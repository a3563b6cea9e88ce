//! Engine library for cluster sponsor usage reports
//!
//! This crate provides the core functionality for:
//! - Accounting export ingestion and GPU classification
//! - Per-pool usage aggregation, efficiency and ranking
//! - Identity resolution and the sponsor join
//! - Storage quota attribution
//! - Run metrics and structured logging

pub mod accounting;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod models;
pub mod observability;
pub mod period;
pub mod pipeline;
pub mod storage;
pub mod usage;

pub use config::{EngineConfig, ProbeConfig};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{Result, UsageError};
pub use models::*;
pub use observability::{ReportMetrics, RunStats, StructuredLogger};
pub use period::{reporting_period, ReportKind, ReportingPeriod};
pub use pipeline::{Pipeline, RunInputs, RunOutput};
