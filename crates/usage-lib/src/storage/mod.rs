//! Storage quota join
//!
//! Quota samples arrive keyed by numeric id; this module re-keys them to
//! netids and renders per-fileset shares.

mod format;
mod join;
mod quota;

pub use format::{format_bytes, share_percent};
pub use join::{storage_report, FilesetUsage, StorageContributor, StorageReport, UNKNOWN_NETID};
pub use quota::{
    parse_prom_response, MetricSample, MetricsSource, PromSnapshotDir, StorageQuota,
    QUOTA_USAGE_METRIC,
};
