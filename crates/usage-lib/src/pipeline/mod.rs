//! End-to-end report run
//!
//! A run fetches everything it needs, computes every table in memory and
//! returns them together. Fatal preconditions are checked before any table
//! is built, so a failed run leaves nothing behind; writing the archive is
//! left to the caller once the run has succeeded.

mod archive;

#[cfg(test)]
mod tests;

pub use archive::{archive_rows, write_archive, write_archive_file, ArchiveRow, ARCHIVE_HEADER};

use crate::accounting::{AccountingSource, JobClassifier};
use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, UsageError};
use crate::identity::{
    join_sponsors, sponsor_records, verify_probe, DepartedUsersStrategy, Directory, RunCache,
    SponsorResolver, UidResolution,
};
use crate::models::{SponsorRollup, SponsorSource, SponsoredUsage, UserRollup};
use crate::observability::{RunStats, StructuredLogger};
use crate::storage::{
    storage_report, MetricsSource, StorageQuota, StorageReport, QUOTA_USAGE_METRIC,
};
use crate::usage::{aggregate_usage, rank_usage, rollup_sponsors, rollup_users, EfficiencyEngine};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Collaborators for one run
pub struct RunInputs<'a> {
    pub accounting: &'a dyn AccountingSource,
    pub directory: &'a dyn Directory,
    pub departed_users: Option<DepartedUsersStrategy>,
    /// Id mappings already merged from the uid snapshot and audit log
    pub uids: UidResolution,
    /// Storage is skipped without a metrics source
    pub metrics: Option<&'a dyn MetricsSource>,
}

/// Every table a run produces
#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub usage: Vec<SponsoredUsage>,
    pub users: Vec<UserRollup>,
    pub sponsors: Vec<SponsorRollup>,
    pub storage: Vec<StorageReport>,
    pub archive: Vec<ArchiveRow>,
    pub diagnostics: Diagnostics,
    pub stats: RunStats,
}

pub struct Pipeline {
    config: EngineConfig,
    logger: StructuredLogger,
}

impl Pipeline {
    pub fn new(config: EngineConfig, logger: StructuredLogger) -> Self {
        Self { config, logger }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self, inputs: RunInputs<'_>) -> Result<RunOutput> {
        let result = self.run_inner(inputs);
        if let Err(e) = &result {
            self.logger.log_run_aborted(&e.to_string());
        }
        result
    }

    fn run_inner(&self, inputs: RunInputs<'_>) -> Result<RunOutput> {
        let started = Instant::now();
        let config = &self.config;
        let mut diagnostics = Diagnostics::new();
        self.logger.log_run_started(
            &config.clusters,
            config.probe.as_ref().map(|p| p.netid.as_str()),
        );

        let resolver = SponsorResolver::with_defaults(config, inputs.departed_users);
        let mut cache = RunCache::new(inputs.directory, resolver);
        if let Some(probe) = &config.probe {
            verify_probe(&mut cache, probe, &mut diagnostics)?;
        }

        let records = inputs.accounting.fetch(&mut diagnostics)?;
        let jobs_ingested = records.len();
        let jobs = JobClassifier::from_config(config).classify(records, &mut diagnostics);
        let jobs_rejected = jobs_ingested - jobs.len();
        self.logger.log_stage("classify", jobs.len());

        let usage = aggregate_usage(&jobs);
        if usage.len() < config.min_aggregate_rows {
            return Err(UsageError::InsufficientData {
                rows: usage.len(),
                minimum: config.min_aggregate_rows,
            });
        }
        self.logger.log_stage("aggregate", usage.len());

        let efficiency = EfficiencyEngine::new(config).compute(&jobs, &mut diagnostics);
        self.logger.log_stage("efficiency", efficiency.len());
        let ranked = rank_usage(usage, &efficiency, config);

        let sponsor_records = sponsor_records(
            ranked.iter().map(|r| r.usage.netid.as_str()),
            &mut cache,
            &mut diagnostics,
        )?;
        let unresolved_identities = sponsor_records
            .values()
            .filter(|r| r.source == SponsorSource::Unresolved)
            .count();
        let sponsored = join_sponsors(ranked, &sponsor_records, config, &mut diagnostics);

        let users = rollup_users(&sponsored, &mut diagnostics);
        let sponsor_netids: BTreeSet<&str> = users.iter().map(|u| u.sponsor.as_str()).collect();
        let mut sponsor_names = BTreeMap::new();
        for netid in sponsor_netids {
            sponsor_names.insert(netid.to_string(), cache.sponsor_full_name(netid)?);
        }
        let sponsors = rollup_sponsors(users.clone(), |netid| {
            sponsor_names.get(netid).cloned().flatten()
        });
        self.logger.log_stage("rollup", sponsors.len());

        let mut uids = inputs.uids;
        let storage = match inputs.metrics {
            Some(metrics) if !config.sponsor_filesets.is_empty() => {
                let samples = metrics.query(QUOTA_USAGE_METRIC)?;
                let quota = StorageQuota::from_samples(samples, &mut diagnostics);
                let mut reports = Vec::with_capacity(config.sponsor_filesets.len());
                for (sponsor, keys) in &config.sponsor_filesets {
                    reports.push(storage_report(
                        sponsor,
                        keys,
                        &quota,
                        &mut uids,
                        &mut cache,
                        &mut diagnostics,
                    )?);
                }
                reports
            }
            _ => Vec::new(),
        };
        let unresolved_storage_ids = diagnostics.count("unresolved_id");

        let archive = archive_rows(&sponsored);
        let summary = diagnostics.summary();
        self.logger.log_diagnostics_summary(&summary);

        let stats = RunStats {
            jobs_ingested,
            jobs_rejected,
            aggregate_rows: sponsored.len(),
            corrupt_telemetry_rows: efficiency.total_dropped(),
            directory_lookups: cache.directory_lookups(),
            unresolved_identities,
            unresolved_storage_ids,
            diagnostics: summary,
            duration_seconds: started.elapsed().as_secs_f64(),
        };
        self.logger.log_run_finished(&stats);

        Ok(RunOutput {
            usage: sponsored,
            users,
            sponsors,
            storage,
            archive,
            diagnostics,
            stats,
        })
    }

    /// Storage join for a single sponsor, outside a full run
    pub fn storage_for_sponsor(
        &self,
        sponsor: &str,
        directory: &dyn Directory,
        mut uids: UidResolution,
        metrics: &dyn MetricsSource,
    ) -> Result<(StorageReport, Diagnostics)> {
        let mut diagnostics = Diagnostics::new();
        let keys = self
            .config
            .sponsor_filesets
            .get(sponsor)
            .cloned()
            .unwrap_or_default();
        let resolver = SponsorResolver::with_defaults(&self.config, None);
        let mut cache = RunCache::new(directory, resolver);
        let samples = metrics.query(QUOTA_USAGE_METRIC)?;
        let quota = StorageQuota::from_samples(samples, &mut diagnostics);
        let report = storage_report(
            sponsor,
            &keys,
            &quota,
            &mut uids,
            &mut cache,
            &mut diagnostics,
        )?;
        Ok((report, diagnostics))
    }
}
