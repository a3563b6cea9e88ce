//! Identity resolution and the sponsor join
//!
//! This module provides:
//! - the directory trait and its LDIF snapshot adapter
//! - primary-sponsor strategies and per-cluster overrides
//! - a run-scoped lookup cache
//! - numeric id resolution for storage samples
//! - display-name formatting

mod cache;
mod directory;
mod names;
mod overrides;
mod resolver;
mod uid;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cache::RunCache;
pub use directory::{uid_from_dn, Directory, DirectoryEntry, LdifDirectory};
pub use names::format_user_name;
pub use overrides::parse_overrides;
pub use resolver::{
    DepartedUsersStrategy, DirectoryManagerStrategy, PrimarySponsor, SponsorResolver,
    SponsorStrategy,
};
pub use uid::UidResolution;

use crate::config::{EngineConfig, ProbeConfig};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Result, UsageError};
use crate::models::{RankedUsage, SponsorRecord, SponsorSource, SponsoredUsage};
use std::collections::BTreeMap;
use tracing::info;

/// Check the directory against an identity whose sponsor is known
///
/// Any mismatch means the directory cannot be trusted for this run.
pub fn verify_probe(
    cache: &mut RunCache<'_>,
    probe: &ProbeConfig,
    diagnostics: &mut Diagnostics,
) -> Result<SponsorRecord> {
    let record = cache.sponsor_record(&probe.netid, diagnostics)?;
    let unavailable = |detail: String| UsageError::DirectoryServiceUnavailable {
        netid: probe.netid.clone(),
        detail,
    };

    if record.source == SponsorSource::Unresolved {
        return Err(unavailable("returned no sponsor".to_string()));
    }
    if let Some((cluster, found)) = record
        .sponsors
        .iter()
        .find(|(_, sponsor)| sponsor.as_deref() != Some(probe.expected_sponsor.as_str()))
    {
        return Err(unavailable(format!(
            "returned sponsor {} on {} instead of {}",
            found.as_deref().unwrap_or("none"),
            cluster,
            probe.expected_sponsor
        )));
    }

    info!(event = "directory_probe_passed", netid = %probe.netid, "Directory probe passed");
    Ok(record)
}

/// Resolve every distinct netid once, in sorted order
pub fn sponsor_records<'n>(
    netids: impl IntoIterator<Item = &'n str>,
    cache: &mut RunCache<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeMap<String, SponsorRecord>> {
    let mut unique: Vec<&str> = netids.into_iter().collect();
    unique.sort_unstable();
    unique.dedup();

    let mut records = BTreeMap::new();
    for netid in unique {
        records.insert(netid.to_string(), cache.sponsor_record(netid, diagnostics)?);
    }
    Ok(records)
}

/// Attach each row's cluster sponsor and formatted name
///
/// A resolved identity with no sponsor on the row's cluster (a cluster outside
/// the configured list) is reported here; unresolved identities were already
/// reported by the resolver.
pub fn join_sponsors(
    ranked: Vec<RankedUsage>,
    records: &BTreeMap<String, SponsorRecord>,
    config: &EngineConfig,
    diagnostics: &mut Diagnostics,
) -> Vec<SponsoredUsage> {
    ranked
        .into_iter()
        .map(|row| {
            let record = records.get(&row.usage.netid);
            let cluster = &row.usage.pool.cluster;
            let sponsor = record.and_then(|r| r.sponsor_for(cluster)).map(String::from);

            if sponsor.is_none() && record.is_some_and(|r| r.source != SponsorSource::Unresolved) {
                diagnostics.record(Diagnostic::MissingIdentity {
                    netid: row.usage.netid.clone(),
                    cluster: Some(cluster.clone()),
                    reason: "no sponsor configured for this cluster".to_string(),
                });
            }

            let name = record
                .and_then(|r| r.displayname.as_deref())
                .map(|full| format_user_name(full, config.name_length_budget));

            SponsoredUsage {
                ranked: row,
                sponsor,
                name,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Efficiency, EfficiencyAggregate, PoolKey, Rank, UsageAggregate};
    use crate::identity::fixtures::LDIF;
    use std::collections::BTreeSet;

    fn ranked(cluster: &str, netid: &str) -> RankedUsage {
        RankedUsage {
            usage: UsageAggregate {
                pool: PoolKey::new(cluster, "cpu"),
                netid: netid.into(),
                cpu_hours: 1,
                gpu_hours: 0,
                jobs: 1,
                accounts: BTreeSet::new(),
                partition: "cpu".into(),
            },
            efficiency: EfficiencyAggregate {
                cpu_eff: Efficiency::NoData,
                gpu_eff: Efficiency::NotApplicable,
                jobs_counted: 0,
            },
            cpu_rank: Rank::Position { rank: 1, total: 1 },
            gpu_rank: Rank::NotApplicable,
        }
    }

    fn directory() -> LdifDirectory {
        LdifDirectory::parse(LDIF, "ldif", &mut Diagnostics::new())
    }

    #[test]
    fn test_probe() {
        let directory = directory();
        let config = EngineConfig::default();
        let mut cache = RunCache::new(&directory, SponsorResolver::with_defaults(&config, None));
        let mut diags = Diagnostics::new();

        let ok = ProbeConfig {
            netid: "gbwright".into(),
            expected_sponsor: "curt".into(),
        };
        assert!(verify_probe(&mut cache, &ok, &mut diags).is_ok());

        // jdh4 has per-cluster overrides, so "curt" is not the sponsor everywhere
        let overridden = ProbeConfig {
            netid: "jdh4".into(),
            expected_sponsor: "curt".into(),
        };
        let err = verify_probe(&mut cache, &overridden, &mut diags).unwrap_err();
        assert!(err.is_fatal_precondition());

        let missing = ProbeConfig {
            netid: "bigfoot".into(),
            expected_sponsor: "curt".into(),
        };
        assert!(matches!(
            verify_probe(&mut cache, &missing, &mut diags),
            Err(UsageError::DirectoryServiceUnavailable { .. })
        ));
    }

    #[test]
    fn test_join_sponsors() {
        let directory = directory();
        let config = EngineConfig::default();
        let mut cache = RunCache::new(&directory, SponsorResolver::with_defaults(&config, None));
        let mut diags = Diagnostics::new();

        let rows = vec![
            ranked("della", "jdh4"),
            ranked("tiger", "jdh4"),
            ranked("della", "bigfoot"),
            ranked("adroit", "gbwright"),
            ranked("della", "gbwright"),
        ];
        let records = sponsor_records(
            rows.iter().map(|r| r.usage.netid.as_str()),
            &mut cache,
            &mut diags,
        )
        .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(cache.directory_lookups(), 3);

        let joined = join_sponsors(rows, &records, &config, &mut diags);
        assert_eq!(joined[0].sponsor.as_deref(), Some("curt"));
        assert_eq!(joined[0].name.as_deref(), Some("Jonathan Halverson"));
        assert_eq!(joined[1].sponsor.as_deref(), Some("jdh4"));
        assert_eq!(joined[2].sponsor, None);
        assert_eq!(joined[2].name, None);
        assert_eq!(joined[3].sponsor, None);
        assert_eq!(joined[4].name.as_deref(), Some("Garrett Wright"));

        // bigfoot from the resolver, gbwright on adroit from the join
        assert_eq!(diags.count("missing_identity"), 2);
    }
}
