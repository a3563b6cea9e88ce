//! Observability for report runs
//!
//! Provides:
//! - Prometheus gauges describing the last run, exportable for a textfile collector
//! - Structured logging of run milestones with tracing

use crate::error::Result;
use prometheus::{
    register_gauge, register_int_gauge, register_int_gauge_vec, Encoder, Gauge, IntGauge,
    IntGaugeVec, TextEncoder,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ReportMetricsInner> = OnceLock::new();

struct ReportMetricsInner {
    jobs_ingested: IntGauge,
    jobs_rejected: IntGauge,
    aggregate_rows: IntGauge,
    corrupt_telemetry_rows: IntGauge,
    directory_lookups: IntGauge,
    unresolved_identities: IntGauge,
    unresolved_storage_ids: IntGauge,
    diagnostics: IntGaugeVec,
    run_duration_seconds: Gauge,
    last_success_timestamp: IntGauge,
}

impl ReportMetricsInner {
    fn new() -> Self {
        Self {
            jobs_ingested: register_int_gauge!(
                "sponsor_usage_jobs_ingested",
                "Job records read from the accounting export in the last run"
            )
            .expect("Failed to register jobs_ingested"),

            jobs_rejected: register_int_gauge!(
                "sponsor_usage_jobs_rejected",
                "Job records rejected during classification in the last run"
            )
            .expect("Failed to register jobs_rejected"),

            aggregate_rows: register_int_gauge!(
                "sponsor_usage_aggregate_rows",
                "Per-(pool, netid) usage rows produced by the last run"
            )
            .expect("Failed to register aggregate_rows"),

            corrupt_telemetry_rows: register_int_gauge!(
                "sponsor_usage_corrupt_telemetry_rows",
                "Jobs dropped from efficiency because used exceeded total"
            )
            .expect("Failed to register corrupt_telemetry_rows"),

            directory_lookups: register_int_gauge!(
                "sponsor_usage_directory_lookups",
                "Queries that reached the directory in the last run"
            )
            .expect("Failed to register directory_lookups"),

            unresolved_identities: register_int_gauge!(
                "sponsor_usage_unresolved_identities",
                "Netids without a primary sponsor in the last run"
            )
            .expect("Failed to register unresolved_identities"),

            unresolved_storage_ids: register_int_gauge!(
                "sponsor_usage_unresolved_storage_ids",
                "Storage ids rendered as UNKNOWN in the last run"
            )
            .expect("Failed to register unresolved_storage_ids"),

            diagnostics: register_int_gauge_vec!(
                "sponsor_usage_diagnostics",
                "Data-quality findings of the last run by kind",
                &["kind"]
            )
            .expect("Failed to register diagnostics"),

            run_duration_seconds: register_gauge!(
                "sponsor_usage_run_duration_seconds",
                "Wall-clock duration of the last run"
            )
            .expect("Failed to register run_duration_seconds"),

            last_success_timestamp: register_int_gauge!(
                "sponsor_usage_last_success_timestamp_seconds",
                "Unix time the last successful run finished"
            )
            .expect("Failed to register last_success_timestamp"),
        }
    }
}

/// Counts describing one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub jobs_ingested: usize,
    pub jobs_rejected: usize,
    pub aggregate_rows: usize,
    pub corrupt_telemetry_rows: usize,
    pub directory_lookups: usize,
    pub unresolved_identities: usize,
    pub unresolved_storage_ids: usize,
    pub diagnostics: BTreeMap<&'static str, usize>,
    pub duration_seconds: f64,
}

/// Lightweight handle to the global run metrics
#[derive(Clone)]
pub struct ReportMetrics {
    _private: (),
}

impl Default for ReportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ReportMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ReportMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Replace the gauges with the figures of a finished run
    pub fn record_run(&self, stats: &RunStats) {
        let inner = self.inner();
        inner.jobs_ingested.set(stats.jobs_ingested as i64);
        inner.jobs_rejected.set(stats.jobs_rejected as i64);
        inner.aggregate_rows.set(stats.aggregate_rows as i64);
        inner
            .corrupt_telemetry_rows
            .set(stats.corrupt_telemetry_rows as i64);
        inner.directory_lookups.set(stats.directory_lookups as i64);
        inner
            .unresolved_identities
            .set(stats.unresolved_identities as i64);
        inner
            .unresolved_storage_ids
            .set(stats.unresolved_storage_ids as i64);

        inner.diagnostics.reset();
        for (kind, count) in &stats.diagnostics {
            inner
                .diagnostics
                .with_label_values(&[*kind])
                .set(*count as i64);
        }
        inner.run_duration_seconds.set(stats.duration_seconds);
        inner
            .last_success_timestamp
            .set(chrono::Utc::now().timestamp());
    }

    /// Text exposition of every registered metric
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Write the exposition to a textfile-collector path, replacing it atomically
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let text = self.encode_text()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Structured logger for run milestones
#[derive(Clone)]
pub struct StructuredLogger {
    run_label: String,
}

impl StructuredLogger {
    pub fn new(run_label: impl Into<String>) -> Self {
        Self {
            run_label: run_label.into(),
        }
    }

    pub fn log_run_started(&self, clusters: &[String], probe: Option<&str>) {
        info!(
            event = "run_started",
            run = %self.run_label,
            clusters = %clusters.join(","),
            probe = ?probe,
            "Usage report run started"
        );
    }

    pub fn log_stage(&self, stage: &str, rows: usize) {
        info!(
            event = "stage_completed",
            run = %self.run_label,
            stage = %stage,
            rows = rows,
            "Pipeline stage completed"
        );
    }

    /// One line per diagnostic kind, plus the total
    pub fn log_diagnostics_summary(&self, summary: &BTreeMap<&'static str, usize>) {
        let total: usize = summary.values().sum();
        if total == 0 {
            info!(
                event = "diagnostics_summary",
                run = %self.run_label,
                total = 0,
                "No data-quality findings"
            );
            return;
        }
        for (kind, count) in summary {
            warn!(
                event = "diagnostics_summary",
                run = %self.run_label,
                kind = %kind,
                count = count,
                "Data-quality findings"
            );
        }
        warn!(
            event = "diagnostics_summary",
            run = %self.run_label,
            total = total,
            "Run finished with data-quality findings"
        );
    }

    pub fn log_archive_written(&self, path: &Path, rows: usize) {
        info!(
            event = "archive_written",
            run = %self.run_label,
            path = %path.display(),
            rows = rows,
            "Archive written"
        );
    }

    pub fn log_run_finished(&self, stats: &RunStats) {
        info!(
            event = "run_finished",
            run = %self.run_label,
            jobs_ingested = stats.jobs_ingested,
            jobs_rejected = stats.jobs_rejected,
            aggregate_rows = stats.aggregate_rows,
            directory_lookups = stats.directory_lookups,
            duration_seconds = stats.duration_seconds,
            "Usage report run finished"
        );
    }

    pub fn log_run_aborted(&self, reason: &str) {
        error!(
            event = "run_aborted",
            run = %self.run_label,
            reason = %reason,
            "Usage report run aborted before any output"
        );
    }
}
