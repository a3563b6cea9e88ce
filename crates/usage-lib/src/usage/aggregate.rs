//! Per-(pool, netid) usage totals

use crate::models::{ClassifiedJob, PoolKey, UsageAggregate, SECONDS_PER_HOUR};
use std::collections::{BTreeMap, BTreeSet};

/// Round seconds to whole hours, half to even
pub fn seconds_to_hours(seconds: u64) -> u64 {
    (seconds as f64 / SECONDS_PER_HOUR).round_ties_even() as u64
}

#[derive(Debug, Default)]
struct Totals {
    cpu_seconds: u64,
    gpu_seconds: u64,
    jobs: u64,
    accounts: BTreeSet<String>,
    partition: String,
}

/// Group classified jobs by (pool, netid)
///
/// Output is ordered by pool then netid, independent of input order.
pub fn aggregate_usage(jobs: &[ClassifiedJob]) -> Vec<UsageAggregate> {
    let mut groups: BTreeMap<(PoolKey, String), Totals> = BTreeMap::new();

    for job in jobs {
        let totals = groups
            .entry((job.pool.clone(), job.record.netid.clone()))
            .or_insert_with(|| Totals {
                partition: job.pool.partition.clone(),
                ..Default::default()
            });
        totals.cpu_seconds += job.record.cpu_seconds;
        totals.gpu_seconds += job.gpu_seconds();
        totals.jobs += 1;
        totals.accounts.insert(job.record.account.clone());
    }

    groups
        .into_iter()
        .map(|((pool, netid), totals)| UsageAggregate {
            pool,
            netid,
            cpu_hours: seconds_to_hours(totals.cpu_seconds),
            gpu_hours: seconds_to_hours(totals.gpu_seconds),
            jobs: totals.jobs,
            accounts: totals.accounts,
            partition: totals.partition,
        })
        .collect()
}
