//! Cluster-level rollups for sponsor-facing tables

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::models::{SponsorRollup, SponsoredUsage, UserRollup};
use std::collections::{BTreeMap, BTreeSet};

/// Collapse pool rows into one row per (cluster, netid)
///
/// Rows without a sponsor are left out; they were reported when the sponsor
/// join ran. A netid whose pools disagree on the sponsor is reported and
/// excluded entirely.
pub fn rollup_users(rows: &[SponsoredUsage], diagnostics: &mut Diagnostics) -> Vec<UserRollup> {
    let mut users: BTreeMap<(String, String), UserRollup> = BTreeMap::new();
    let mut conflicted: BTreeSet<(String, String)> = BTreeSet::new();

    for row in rows {
        let Some(sponsor) = row.sponsor.as_deref() else {
            continue;
        };
        let usage = &row.ranked.usage;
        let key = (usage.pool.cluster.clone(), usage.netid.clone());
        if conflicted.contains(&key) {
            continue;
        }

        let entry = users.entry(key.clone()).or_insert_with(|| UserRollup {
            cluster: usage.pool.cluster.clone(),
            netid: usage.netid.clone(),
            name: row.name.clone(),
            sponsor: sponsor.to_string(),
            cpu_hours: 0,
            gpu_hours: 0,
            jobs: 0,
            accounts: BTreeSet::new(),
            partitions: BTreeSet::new(),
        });

        if entry.sponsor != sponsor {
            diagnostics.record(Diagnostic::MissingIdentity {
                netid: usage.netid.clone(),
                cluster: Some(usage.pool.cluster.clone()),
                reason: format!(
                    "sponsor disagrees across pools ({} vs {})",
                    entry.sponsor, sponsor
                ),
            });
            users.remove(&key);
            conflicted.insert(key);
            continue;
        }

        entry.cpu_hours += usage.cpu_hours;
        entry.gpu_hours += usage.gpu_hours;
        entry.jobs += usage.jobs;
        entry.accounts.extend(usage.accounts.iter().cloned());
        entry.partitions.insert(usage.partition.clone());
        if entry.name.is_none() {
            entry.name = row.name.clone();
        }
    }

    users.into_values().collect()
}

/// Group user rollups by (cluster, sponsor)
///
/// `sponsor_name` supplies the sponsor's full display name.
pub fn rollup_sponsors<F>(users: Vec<UserRollup>, mut sponsor_name: F) -> Vec<SponsorRollup>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut groups: BTreeMap<(String, String), Vec<UserRollup>> = BTreeMap::new();
    for user in users {
        groups
            .entry((user.cluster.clone(), user.sponsor.clone()))
            .or_default()
            .push(user);
    }

    groups
        .into_iter()
        .map(|((cluster, sponsor), mut members)| {
            members.sort_by(|a, b| {
                b.cpu_hours
                    .cmp(&a.cpu_hours)
                    .then_with(|| a.netid.cmp(&b.netid))
            });
            SponsorRollup {
                sponsor_name: sponsor_name(&sponsor),
                cpu_hours: members.iter().map(|m| m.cpu_hours).sum(),
                gpu_hours: members.iter().map(|m| m.gpu_hours).sum(),
                jobs: members.iter().map(|m| m.jobs).sum(),
                cluster,
                sponsor,
                members,
            }
        })
        .collect()
}
