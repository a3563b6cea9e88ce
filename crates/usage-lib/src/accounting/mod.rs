//! Job record ingestion and classification
//!
//! This module turns raw accounting rows into classified jobs:
//! - reading the accounting export
//! - renaming clusters and partitions
//! - GPU classification from allocated resources
//! - partition delineation into resource pools

mod export;
mod partition;
mod telemetry;
mod tres;

pub use export::{read_export, SacctExportFile, EXPORT_FIELDS};
pub use partition::PoolDelineator;
pub use telemetry::{decode_snapshot, is_empty_snapshot, TelemetryError};
pub use tres::{gpu_units, is_gpu_job};

#[cfg(test)]
pub(crate) use telemetry::encode_jobstats;

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::Result;
use crate::models::{ClassifiedJob, JobRecord};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Source of raw job records for the reporting period
pub trait AccountingSource {
    /// Fetch all records, recording unparsable rows as diagnostics
    fn fetch(&self, diagnostics: &mut Diagnostics) -> Result<Vec<JobRecord>>;
}

/// Delineated partition label using the default pool table
pub fn delineate_pool(cluster: &str, is_gpu_job: bool, partition: &str) -> String {
    PoolDelineator::from_config(&EngineConfig::default()).delineate(cluster, is_gpu_job, partition)
}

/// Normalizes and classifies job records
#[derive(Debug, Clone)]
pub struct JobClassifier {
    cluster_renamings: BTreeMap<String, String>,
    partition_renamings: BTreeMap<String, String>,
    delineator: PoolDelineator,
}

impl JobClassifier {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            cluster_renamings: config.cluster_renamings.iter().cloned().collect(),
            partition_renamings: config.partition_renamings.iter().cloned().collect(),
            delineator: PoolDelineator::from_config(config),
        }
    }

    fn rename(table: &BTreeMap<String, String>, value: String) -> String {
        match table.get(&value) {
            Some(renamed) => renamed.clone(),
            None => value,
        }
    }

    /// Classify one record
    pub fn classify_one(&self, mut record: JobRecord) -> Result<ClassifiedJob> {
        record.cluster = Self::rename(&self.cluster_renamings, record.cluster);
        record.partition = Self::rename(&self.partition_renamings, record.partition);

        let gpu_units = gpu_units(&record.alloc_resources)?;
        let is_gpu_job = gpu_units > 0;
        let pool = self
            .delineator
            .pool_key(&record.cluster, is_gpu_job, &record.partition);

        Ok(ClassifiedJob {
            record,
            gpu_units,
            is_gpu_job,
            pool,
        })
    }

    /// Classify all records
    ///
    /// Records with a malformed allocation or an already seen jobid are
    /// rejected and reported; the rest pass through in input order.
    pub fn classify(
        &self,
        records: Vec<JobRecord>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<ClassifiedJob> {
        let total = records.len();
        let mut seen = HashSet::with_capacity(total);
        let mut jobs = Vec::with_capacity(total);

        for record in records {
            if !seen.insert(record.jobid.clone()) {
                diagnostics.record(Diagnostic::DuplicateRecord {
                    source_name: "accounting".to_string(),
                    key: record.jobid,
                });
                continue;
            }
            let jobid = record.jobid.clone();
            let spec = record.alloc_resources.clone();
            match self.classify_one(record) {
                Ok(job) => jobs.push(job),
                Err(_) => diagnostics.record(Diagnostic::MalformedResourceSpec { jobid, spec }),
            }
        }

        info!(
            event = "jobs_classified",
            records = total,
            accepted = jobs.len(),
            gpu_jobs = jobs.iter().filter(|j| j.is_gpu_job).count(),
            "Classified job records"
        );
        jobs
    }
}
