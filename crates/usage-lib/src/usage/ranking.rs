//! In-pool rankings
//!
//! Identities are ranked by descending usage with ascending netid as the
//! tie-break, so equal values get consecutive distinct ranks. Any identity
//! with zero usage is placed last (`n/n`); several zero-usage identities all
//! share that last place.

use super::efficiency::EfficiencyTable;
use crate::config::EngineConfig;
use crate::models::{PoolKey, Rank, RankedUsage, UsageAggregate};
use std::collections::BTreeMap;

/// Rank `(netid, value)` pairs of one pool
///
/// Returned ranks are in the same order as the input.
pub fn rank_values(entries: &[(&str, u64)]) -> Vec<Rank> {
    let total = entries.len();
    let mut order: Vec<usize> = (0..total).collect();
    order.sort_by(|&a, &b| {
        let (netid_a, value_a) = entries[a];
        let (netid_b, value_b) = entries[b];
        value_b.cmp(&value_a).then_with(|| netid_a.cmp(netid_b))
    });

    let mut ranks = vec![Rank::NotApplicable; total];
    for (position, index) in order.into_iter().enumerate() {
        let rank = if entries[index].1 == 0 {
            total
        } else {
            position + 1
        };
        ranks[index] = Rank::Position { rank, total };
    }
    ranks
}

/// Attach efficiency and CPU/GPU ranks to every aggregate
///
/// Output keeps the input order.
pub fn rank_usage(
    usage: Vec<UsageAggregate>,
    efficiency: &EfficiencyTable,
    config: &EngineConfig,
) -> Vec<RankedUsage> {
    let mut pools: BTreeMap<PoolKey, Vec<usize>> = BTreeMap::new();
    for (index, row) in usage.iter().enumerate() {
        pools.entry(row.pool.clone()).or_default().push(index);
    }

    let mut cpu_ranks = vec![Rank::NotApplicable; usage.len()];
    let mut gpu_ranks = vec![Rank::NotApplicable; usage.len()];

    for (pool, members) in &pools {
        let cpu: Vec<(&str, u64)> = members
            .iter()
            .map(|&i| (usage[i].netid.as_str(), usage[i].cpu_hours))
            .collect();
        for (&i, rank) in members.iter().zip(rank_values(&cpu)) {
            cpu_ranks[i] = rank;
        }

        if config.is_gpu_pool(&pool.as_key()) {
            let gpu: Vec<(&str, u64)> = members
                .iter()
                .map(|&i| (usage[i].netid.as_str(), usage[i].gpu_hours))
                .collect();
            for (&i, rank) in members.iter().zip(rank_values(&gpu)) {
                gpu_ranks[i] = rank;
            }
        }
    }

    usage
        .into_iter()
        .zip(cpu_ranks.into_iter().zip(gpu_ranks))
        .map(|(row, (cpu_rank, gpu_rank))| {
            let efficiency = efficiency.get(&row.pool, &row.netid);
            RankedUsage {
                usage: row,
                efficiency,
                cpu_rank,
                gpu_rank,
            }
        })
        .collect()
}
