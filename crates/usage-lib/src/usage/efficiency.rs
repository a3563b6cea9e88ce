//! CPU and GPU utilization efficiency
//!
//! Efficiency is the ratio of used to allocated seconds, summed over a
//! user's eligible jobs in a pool. Jobs shorter than the minimum elapsed time
//! or without telemetry are ineligible. Jobs whose telemetry claims more use
//! than was allocated are dropped as corrupt.

use crate::accounting::{decode_snapshot, is_empty_snapshot};
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::models::{ClassifiedJob, Efficiency, EfficiencyAggregate, PoolKey, TelemetrySnapshot};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Used and total seconds for one resource
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsagePair {
    pub used: f64,
    pub total: f64,
}

impl UsagePair {
    pub fn new(used: f64, total: f64) -> Self {
        Self { used, total }
    }

    pub fn is_corrupt(&self) -> bool {
        self.used > self.total
    }

    fn add(&mut self, other: UsagePair) {
        self.used += other.used;
        self.total += other.total;
    }

    /// Rounded percentage, `NoData` when nothing was allocated
    pub fn efficiency(&self) -> Efficiency {
        if self.total == 0.0 {
            Efficiency::NoData
        } else {
            Efficiency::Percent((100.0 * self.used / self.total).round_ties_even() as u32)
        }
    }
}

/// Pairs computed from one eligible job
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobEfficiency {
    pub cpu: UsagePair,
    pub gpu: Option<UsagePair>,
}

impl JobEfficiency {
    /// CPU pair always; GPU pair only for GPU-capable pools
    pub fn from_snapshot(snapshot: &TelemetrySnapshot, gpu_pool: bool) -> Self {
        let gpu = gpu_pool.then(|| {
            UsagePair::new(
                snapshot.gpu_used_seconds.unwrap_or(0.0),
                snapshot.gpu_total_seconds.unwrap_or(0.0),
            )
        });
        Self {
            cpu: UsagePair::new(snapshot.cpu_used_seconds, snapshot.cpu_total_seconds),
            gpu,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        self.cpu.is_corrupt() || self.gpu.map(|g| g.is_corrupt()).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct Sums {
    cpu: UsagePair,
    gpu: UsagePair,
    jobs: u64,
}

/// Efficiency per (pool, netid) with pool-level defaults
#[derive(Debug, Clone, Default)]
pub struct EfficiencyTable {
    entries: BTreeMap<(PoolKey, String), EfficiencyAggregate>,
    dropped: BTreeMap<String, usize>,
    gpu_pools: BTreeSet<String>,
}

impl EfficiencyTable {
    /// Efficiency for an identity; identities without eligible jobs get sentinels
    pub fn get(&self, pool: &PoolKey, netid: &str) -> EfficiencyAggregate {
        self.entries
            .get(&(pool.clone(), netid.to_string()))
            .copied()
            .unwrap_or_else(|| EfficiencyAggregate {
                cpu_eff: Efficiency::NoData,
                gpu_eff: self.gpu_default(&pool.as_key()),
                jobs_counted: 0,
            })
    }

    fn gpu_default(&self, pool_key: &str) -> Efficiency {
        if self.gpu_pools.contains(pool_key) {
            Efficiency::NoData
        } else {
            Efficiency::NotApplicable
        }
    }

    /// Corrupt-telemetry jobs dropped per pool key
    pub fn dropped(&self) -> &BTreeMap<String, usize> {
        &self.dropped
    }

    pub fn total_dropped(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes the efficiency table for a set of jobs
pub struct EfficiencyEngine<'a> {
    config: &'a EngineConfig,
}

impl<'a> EfficiencyEngine<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    fn is_eligible(&self, job: &ClassifiedJob) -> bool {
        job.record.elapsed_seconds >= self.config.min_efficiency_elapsed_secs
            && !is_empty_snapshot(&job.record.telemetry)
    }

    pub fn compute(
        &self,
        jobs: &[ClassifiedJob],
        diagnostics: &mut Diagnostics,
    ) -> EfficiencyTable {
        let mut sums: BTreeMap<(PoolKey, String), Sums> = BTreeMap::new();
        let mut dropped: BTreeMap<String, usize> = BTreeMap::new();

        for job in jobs.iter().filter(|j| self.is_eligible(j)) {
            let decoded = decode_snapshot(&job.record.telemetry, job.record.elapsed_seconds);
            let snapshot = match decoded {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => continue,
                Err(e) => {
                    diagnostics.record(Diagnostic::UndecodableTelemetry {
                        jobid: job.record.jobid.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let pool_key = job.pool.as_key();
            let pairs = JobEfficiency::from_snapshot(&snapshot, self.config.is_gpu_pool(&pool_key));
            if pairs.is_corrupt() {
                debug!(
                    jobid = %job.record.jobid,
                    pool = %pool_key,
                    "Dropping job with used > total telemetry"
                );
                *dropped.entry(pool_key).or_insert(0) += 1;
                continue;
            }

            let entry = sums
                .entry((job.pool.clone(), job.record.netid.clone()))
                .or_default();
            entry.cpu.add(pairs.cpu);
            if let Some(gpu) = pairs.gpu {
                entry.gpu.add(gpu);
            }
            entry.jobs += 1;
        }

        for (pool_key, count) in &dropped {
            diagnostics.record(Diagnostic::CorruptTelemetry {
                pool_key: pool_key.clone(),
                dropped: *count,
            });
        }

        let entries = sums
            .into_iter()
            .map(|(key, s)| {
                let pool_key = key.0.as_key();
                let gpu_eff = if !self.config.is_gpu_pool(&pool_key) {
                    Efficiency::NotApplicable
                } else if self.config.has_unreliable_gpu_telemetry(&pool_key) {
                    Efficiency::NoData
                } else {
                    s.gpu.efficiency()
                };
                let aggregate = EfficiencyAggregate {
                    cpu_eff: s.cpu.efficiency(),
                    gpu_eff,
                    jobs_counted: s.jobs,
                };
                (key, aggregate)
            })
            .collect();

        EfficiencyTable {
            entries,
            dropped,
            gpu_pools: self.config.gpu_pools.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::{encode_jobstats, JobClassifier};
    use crate::models::JobRecord;

    fn classify(record: JobRecord) -> ClassifiedJob {
        JobClassifier::from_config(&EngineConfig::default())
            .classify_one(record)
            .unwrap()
    }

    /// Single-core `della__cpu` job
    fn cpu_job(jobid: &str, elapsed: u64, telemetry: impl Into<String>) -> ClassifiedJob {
        classify(
            JobRecord::for_test(jobid, "jdh4", ("della", "cpu"))
                .with_seconds(elapsed, elapsed)
                .with_tres("cpu=1,node=1")
                .with_telemetry(telemetry),
        )
    }

    /// One-GPU job that kept its GPU 40% busy
    fn gpu_job(pool: (&str, &str)) -> ClassifiedJob {
        classify(
            JobRecord::for_test("1", "jdh4", pool)
                .with_seconds(1000, 1000)
                .with_tres("cpu=1,gres/gpu=1,node=1")
                .with_telemetry(gpu_stats(900.0, 40.0)),
        )
    }

    fn cpu_stats(cpus: u32, used: f64) -> String {
        encode_jobstats(&format!(
            r#"{{"nodes": {{"n1": {{"cpus": {}, "total_time": {}}}}}}}"#,
            cpus, used
        ))
    }

    fn gpu_stats(used_cpu: f64, util: f64) -> String {
        encode_jobstats(&format!(
            r#"{{"nodes": {{"n1": {{"cpus": 1, "total_time": {}, "gpu_utilization": {{"0": {}}}}}}}}}"#,
            used_cpu, util
        ))
    }

    #[test]
    fn test_cpu_efficiency_sums_over_jobs() {
        let config = EngineConfig::default();
        let jobs = vec![
            cpu_job("1", 1000, cpu_stats(1, 500.0)),
            cpu_job("2", 1000, cpu_stats(1, 1000.0)),
        ];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);

        let eff = table.get(&PoolKey::new("della", "cpu"), "jdh4");
        assert_eq!(eff.cpu_eff, Efficiency::Percent(75));
        assert_eq!(eff.gpu_eff, Efficiency::NotApplicable);
        assert_eq!(eff.jobs_counted, 2);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_corrupt_row_excluded_entirely() {
        let config = EngineConfig::default();
        // 120 used of 100 allocated: dropped, not clamped
        let jobs = vec![
            cpu_job("1", 400, cpu_stats(1, 480.0)),
            cpu_job("2", 400, cpu_stats(1, 100.0)),
        ];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);

        let eff = table.get(&PoolKey::new("della", "cpu"), "jdh4");
        assert_eq!(eff.cpu_eff, Efficiency::Percent(25));
        assert_eq!(eff.jobs_counted, 1);
        assert_eq!(table.dropped().get("della__cpu"), Some(&1));
        assert_eq!(diags.count("corrupt_telemetry"), 1);
    }

    #[test]
    fn test_only_corrupt_rows_leaves_no_data() {
        let config = EngineConfig::default();
        let jobs = vec![cpu_job("1", 400, cpu_stats(1, 480.0))];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);
        assert!(table.is_empty());
        assert_eq!(table.get(&PoolKey::new("della", "cpu"), "jdh4").cpu_eff, Efficiency::NoData);
    }

    #[test]
    fn test_usage_pair_corruption_rule() {
        assert!(UsagePair::new(120.0, 100.0).is_corrupt());
        assert!(!UsagePair::new(100.0, 100.0).is_corrupt());
        assert_eq!(UsagePair::new(0.0, 0.0).efficiency(), Efficiency::NoData);
    }

    #[test]
    fn test_short_and_missing_telemetry_ineligible() {
        let config = EngineConfig::default();
        let jobs = vec![
            cpu_job("1", 359, cpu_stats(1, 100.0)),
            cpu_job("2", 3600, "JS1:None"),
            cpu_job("3", 3600, String::new()),
        ];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);
        assert!(table.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_gpu_efficiency_in_gpu_pool() {
        let config = EngineConfig::default();
        let jobs = vec![gpu_job(("della", "gpu"))];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);

        let eff = table.get(&PoolKey::new("della", "gpu"), "jdh4");
        assert_eq!(eff.cpu_eff, Efficiency::Percent(90));
        assert_eq!(eff.gpu_eff, Efficiency::Percent(40));
    }

    #[test]
    fn test_unreliable_gpu_pool_reports_no_data() {
        let config = EngineConfig::default();
        let jobs = vec![gpu_job(("della", "mig"))];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);

        let eff = table.get(&PoolKey::new("della", "mig"), "jdh4");
        assert_eq!(eff.cpu_eff, Efficiency::Percent(90));
        assert_eq!(eff.gpu_eff, Efficiency::NoData);
    }

    #[test]
    fn test_gpu_job_outside_gpu_pool_gets_no_gpu_pair() {
        let config = EngineConfig::default();
        // stellar__all is not GPU-capable, so the GPU pair is never computed
        let jobs = vec![gpu_job(("stellar", "all"))];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);
        assert_eq!(
            table.get(&PoolKey::new("stellar", "all"), "jdh4").gpu_eff,
            Efficiency::NotApplicable
        );
    }

    #[test]
    fn test_undecodable_telemetry_is_diagnosed() {
        let config = EngineConfig::default();
        let jobs = vec![cpu_job("7", 3600, "JS1:%%%")];
        let mut diags = Diagnostics::new();
        let table = EfficiencyEngine::new(&config).compute(&jobs, &mut diags);
        assert!(table.is_empty());
        assert_eq!(diags.count("undecodable_telemetry"), 1);
    }

    #[test]
    fn test_missing_identity_defaults_by_pool() {
        let table =
            EfficiencyEngine::new(&EngineConfig::default()).compute(&[], &mut Diagnostics::new());
        let gpu_eff = |partition: &str| table.get(&PoolKey::new("tiger", partition), "x").gpu_eff;
        assert_eq!(gpu_eff("gpu"), Efficiency::NoData);
        assert_eq!(gpu_eff("cpu"), Efficiency::NotApplicable);
    }
}
