//! Engine configuration
//!
//! Every site-specific table the engine consults lives here so that the
//! binary can load it from a config file. Defaults describe the production
//! clusters.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Minimum elapsed time for a job to count toward efficiency (6 minutes)
pub const DEFAULT_MIN_EFFICIENCY_ELAPSED_SECS: u64 = 6 * 60;

/// Longest "First Last" display name before the first name is abbreviated
pub const DEFAULT_NAME_LENGTH_BUDGET: usize = 18;

/// Directory override value meaning "sponsored by themselves"
pub const DEFAULT_SELF_SPONSOR_SENTINEL: &str = "USER";

/// Known identity checked before any output is produced
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProbeConfig {
    pub netid: String,
    /// Expected sponsor on every configured cluster
    pub expected_sponsor: String,
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Clusters a sponsor record covers
    pub clusters: Vec<String>,

    /// Applied to the cluster field before classification
    pub cluster_renamings: Vec<(String, String)>,

    /// Applied to the partition field before classification
    pub partition_renamings: Vec<(String, String)>,

    /// (cluster, partition) pairs shared by CPU and GPU jobs
    pub shared_partitions: Vec<(String, String)>,

    /// Clusters whose partitions all collapse into `all(cpu)` / `all(gpu)`
    pub collapsed_clusters: Vec<String>,

    /// Pool keys (`cluster__partition`) that run GPU jobs
    pub gpu_pools: Vec<String>,

    /// GPU pools whose utilization telemetry is known to be wrong
    pub unreliable_gpu_telemetry_pools: Vec<String>,

    pub min_efficiency_elapsed_secs: u64,

    pub name_length_budget: usize,

    pub self_sponsor_sentinel: String,

    /// (netid, full name) pairs replacing the directory display name
    pub corrected_full_names: Vec<(String, String)>,

    /// Sponsor netid to the fileset keys (`fs.filesetname`) they own
    pub sponsor_filesets: BTreeMap<String, Vec<String>>,

    pub probe: Option<ProbeConfig>,

    /// Fewer aggregate rows than this aborts the run
    pub min_aggregate_rows: usize,
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clusters: strings(&["della", "stellar", "tiger", "tigressdata", "traverse"]),
            cluster_renamings: pairs(&[("tiger2", "tiger")]),
            partition_renamings: pairs(&[("datascience", "datasci"), ("physics", "phys")]),
            shared_partitions: pairs(&[("tiger", "cryoem")]),
            collapsed_clusters: strings(&["traverse"]),
            gpu_pools: strings(&[
                "della__gpu",
                "della__pli",
                "della__pli-c",
                "della__pli-p",
                "della__mig",
                "stellar__gpu",
                "tiger__cryoem(gpu)",
                "tiger__gpu",
                "tiger__motion",
                "traverse__all(gpu)",
            ]),
            unreliable_gpu_telemetry_pools: strings(&["della__mig"]),
            min_efficiency_elapsed_secs: DEFAULT_MIN_EFFICIENCY_ELAPSED_SECS,
            name_length_budget: DEFAULT_NAME_LENGTH_BUDGET,
            self_sponsor_sentinel: DEFAULT_SELF_SPONSOR_SENTINEL.to_string(),
            corrected_full_names: Vec::new(),
            sponsor_filesets: BTreeMap::new(),
            probe: None,
            min_aggregate_rows: 1,
        }
    }
}

impl EngineConfig {
    pub fn is_gpu_pool(&self, pool_key: &str) -> bool {
        self.gpu_pools.iter().any(|p| p == pool_key)
    }

    pub fn has_unreliable_gpu_telemetry(&self, pool_key: &str) -> bool {
        self.unreliable_gpu_telemetry_pools
            .iter()
            .any(|p| p == pool_key)
    }

    pub fn corrected_name(&self, netid: &str) -> Option<&str> {
        self.corrected_full_names
            .iter()
            .find(|(n, _)| n == netid)
            .map(|(_, name)| name.as_str())
    }
}
