//! Core data models for the usage engine

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// One row of the accounting export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub jobid: String,
    pub netid: String,
    pub cluster: String,
    pub partition: String,
    pub account: String,
    pub cpu_seconds: u64,
    pub elapsed_seconds: u64,
    pub alloc_resources: String,
    /// Unix timestamp, `None` when the scheduler reports `Unknown`
    pub start_time: Option<i64>,
    /// Raw telemetry snapshot, empty when absent
    pub telemetry: String,
}

/// Disambiguated resource pool: cluster plus delineated partition label
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolKey {
    pub cluster: String,
    pub partition: String,
}

impl PoolKey {
    pub fn new(cluster: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            partition: partition.into(),
        }
    }

    /// `cluster__partition`
    pub fn as_key(&self) -> String {
        format!("{}__{}", self.cluster, self.partition)
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}", self.cluster, self.partition)
    }
}

impl Serialize for PoolKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A job record after GPU classification and pool delineation
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedJob {
    pub record: JobRecord,
    pub gpu_units: u32,
    pub is_gpu_job: bool,
    pub pool: PoolKey,
}

impl ClassifiedJob {
    pub fn gpu_seconds(&self) -> u64 {
        self.record.elapsed_seconds * u64::from(self.gpu_units)
    }

    /// CPU time of jobs that allocated no GPUs
    pub fn cpu_only_seconds(&self) -> u64 {
        if self.gpu_units > 0 {
            0
        } else {
            self.record.cpu_seconds
        }
    }

    pub fn cpu_hours(&self) -> f64 {
        self.record.cpu_seconds as f64 / SECONDS_PER_HOUR
    }

    pub fn gpu_hours(&self) -> f64 {
        self.gpu_seconds() as f64 / SECONDS_PER_HOUR
    }

    /// Wall-clock hours to one decimal place
    pub fn elapsed_hours(&self) -> f64 {
        (self.record.elapsed_seconds as f64 / SECONDS_PER_HOUR * 10.0).round_ties_even() / 10.0
    }

    /// Start date as `Mon 5/2`, or `Unknown`
    pub fn start_date_label(&self) -> String {
        self.record
            .start_time
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%a %-m/%-d").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Used/total second pairs decoded from a job's telemetry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub cpu_used_seconds: f64,
    pub cpu_total_seconds: f64,
    pub gpu_used_seconds: Option<f64>,
    pub gpu_total_seconds: Option<f64>,
}

/// Usage totals for one identity in one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageAggregate {
    pub pool: PoolKey,
    pub netid: String,
    pub cpu_hours: u64,
    pub gpu_hours: u64,
    pub jobs: u64,
    pub accounts: BTreeSet<String>,
    pub partition: String,
}

impl UsageAggregate {
    /// Sorted, comma-joined account names
    pub fn accounts_joined(&self) -> String {
        join_sorted(&self.accounts)
    }
}

pub(crate) fn join_sorted(items: &BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// A utilization ratio or the reason there is none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Efficiency {
    Percent(u32),
    /// No eligible telemetry, or the pool's GPU telemetry is untrusted
    NoData,
    /// Pool does not run GPU jobs
    NotApplicable,
}

impl fmt::Display for Efficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Efficiency::Percent(p) => write!(f, "{}%", p),
            Efficiency::NoData => f.write_str("--"),
            Efficiency::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for Efficiency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Efficiency figures for one identity in one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EfficiencyAggregate {
    pub cpu_eff: Efficiency,
    pub gpu_eff: Efficiency,
    pub jobs_counted: u64,
}

/// Position within a pool, rendered `k/n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    Position { rank: usize, total: usize },
    NotApplicable,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rank::Position { rank, total } => write!(f, "{}/{}", rank, total),
            Rank::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Usage with efficiency and in-pool rankings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedUsage {
    pub usage: UsageAggregate,
    pub efficiency: EfficiencyAggregate,
    pub cpu_rank: Rank,
    pub gpu_rank: Rank,
}

/// Where a primary sponsor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsorSource {
    DirectoryManager,
    DepartedUsers,
    Unresolved,
}

/// Per-cluster sponsors and display name for one netid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorRecord {
    pub netid: String,
    pub sponsors: BTreeMap<String, Option<String>>,
    pub displayname: Option<String>,
    pub source: SponsorSource,
}

impl SponsorRecord {
    pub fn sponsor_for(&self, cluster: &str) -> Option<&str> {
        self.sponsors.get(cluster).and_then(|s| s.as_deref())
    }
}

/// RankedUsage joined to its sponsor and formatted name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsoredUsage {
    pub ranked: RankedUsage,
    pub sponsor: Option<String>,
    pub name: Option<String>,
}

/// One identity's usage across all pools of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRollup {
    pub cluster: String,
    pub netid: String,
    pub name: Option<String>,
    pub sponsor: String,
    pub cpu_hours: u64,
    pub gpu_hours: u64,
    pub jobs: u64,
    pub accounts: BTreeSet<String>,
    pub partitions: BTreeSet<String>,
}

impl UserRollup {
    pub fn accounts_joined(&self) -> String {
        join_sorted(&self.accounts)
    }

    pub fn partitions_joined(&self) -> String {
        join_sorted(&self.partitions)
    }
}

/// Everything one sponsor is accountable for on one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorRollup {
    pub cluster: String,
    pub sponsor: String,
    pub sponsor_name: Option<String>,
    pub members: Vec<UserRollup>,
    pub cpu_hours: u64,
    pub gpu_hours: u64,
    pub jobs: u64,
}

/// Builder for accounting rows in unit tests
#[cfg(test)]
impl JobRecord {
    /// A `cses` job in `pool` with no usage, resources or telemetry
    pub(crate) fn for_test(jobid: &str, netid: &str, pool: (&str, &str)) -> Self {
        Self {
            jobid: jobid.into(),
            netid: netid.into(),
            cluster: pool.0.into(),
            partition: pool.1.into(),
            account: "cses".into(),
            cpu_seconds: 0,
            elapsed_seconds: 0,
            alloc_resources: String::new(),
            start_time: None,
            telemetry: String::new(),
        }
    }

    pub(crate) fn with_seconds(mut self, cpu_seconds: u64, elapsed_seconds: u64) -> Self {
        self.cpu_seconds = cpu_seconds;
        self.elapsed_seconds = elapsed_seconds;
        self
    }

    pub(crate) fn with_tres(mut self, tres: &str) -> Self {
        self.alloc_resources = tres.into();
        self
    }

    pub(crate) fn with_account(mut self, account: &str) -> Self {
        self.account = account.into();
        self
    }

    pub(crate) fn with_telemetry(mut self, telemetry: impl Into<String>) -> Self {
        self.telemetry = telemetry.into();
        self
    }
}
