//! Partition delineation
//!
//! Some partitions run both CPU-only and GPU jobs. Usage on those is split
//! into `partition(cpu)` and `partition(gpu)` pools so that the two kinds of
//! work are never ranked against each other.

use crate::config::EngineConfig;
use crate::models::PoolKey;
use std::collections::BTreeSet;

/// Maps (cluster, is_gpu_job, partition) to a disambiguated pool label
#[derive(Debug, Clone, Default)]
pub struct PoolDelineator {
    shared: BTreeSet<(String, String)>,
    collapsed: BTreeSet<String>,
}

fn suffix(is_gpu_job: bool) -> &'static str {
    if is_gpu_job {
        "gpu"
    } else {
        "cpu"
    }
}

impl PoolDelineator {
    pub fn new(
        shared: impl IntoIterator<Item = (String, String)>,
        collapsed: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            shared: shared.into_iter().collect(),
            collapsed: collapsed.into_iter().collect(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.shared_partitions.iter().cloned(),
            config.collapsed_clusters.iter().cloned(),
        )
    }

    /// Delineated partition label
    pub fn delineate(&self, cluster: &str, is_gpu_job: bool, partition: &str) -> String {
        if self.collapsed.contains(cluster) {
            return format!("all({})", suffix(is_gpu_job));
        }
        if self
            .shared
            .contains(&(cluster.to_string(), partition.to_string()))
        {
            return format!("{}({})", partition, suffix(is_gpu_job));
        }
        partition.to_string()
    }

    pub fn pool_key(&self, cluster: &str, is_gpu_job: bool, partition: &str) -> PoolKey {
        PoolKey::new(cluster, self.delineate(cluster, is_gpu_job, partition))
    }
}
