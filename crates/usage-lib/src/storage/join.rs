//! Storage usage per sponsor fileset

use super::format::{format_bytes, share_percent};
use super::quota::StorageQuota;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::Result;
use crate::identity::{RunCache, UidResolution};
use serde::Serialize;
use std::collections::BTreeSet;

/// Placeholder for ids that map to no netid
pub const UNKNOWN_NETID: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageContributor {
    pub id: String,
    pub netid: String,
    pub bytes: u64,
    pub share: u64,
    /// `"{size} ({share}%)"` padded to the widest cell of the fileset
    pub cell: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesetUsage {
    pub key: String,
    pub total_bytes: u64,
    pub contributors: Vec<StorageContributor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageReport {
    pub sponsor: String,
    pub filesets: Vec<FilesetUsage>,
}

impl StorageReport {
    pub fn unknown_count(&self) -> usize {
        self.filesets
            .iter()
            .flat_map(|f| &f.contributors)
            .filter(|c| c.netid == UNKNOWN_NETID)
            .count()
    }
}

/// Everyone with usage under each of a sponsor's fileset keys
///
/// Ids no source can resolve stay in the report as `UNKNOWN` and are
/// reported once each.
pub fn storage_report(
    sponsor: &str,
    fileset_keys: &[String],
    quota: &StorageQuota,
    uids: &mut UidResolution,
    cache: &mut RunCache<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<StorageReport> {
    let mut reported: BTreeSet<String> = BTreeSet::new();
    let mut filesets = Vec::with_capacity(fileset_keys.len());

    for key in fileset_keys {
        let usage = quota.usage_under(key);
        let total_bytes: u64 = usage.iter().map(|(_, b)| b).sum();

        let mut contributors = Vec::with_capacity(usage.len());
        for (id, bytes) in usage {
            let netid = match uids.resolve(id, cache)? {
                Some(netid) => netid,
                None => {
                    if reported.insert(id.to_string()) {
                        diagnostics.record(Diagnostic::UnresolvedId { id: id.to_string() });
                    }
                    UNKNOWN_NETID.to_string()
                }
            };
            let share = share_percent(bytes, total_bytes);
            contributors.push(StorageContributor {
                id: id.to_string(),
                netid,
                bytes,
                share,
                cell: format!("{} ({}%)", format_bytes(bytes), share),
            });
        }

        contributors.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.netid.cmp(&b.netid)));
        let width = contributors
            .iter()
            .map(|c| c.cell.chars().count())
            .max()
            .unwrap_or(0);
        for contributor in &mut contributors {
            contributor.cell = format!("{:>width$}", contributor.cell, width = width);
        }

        filesets.push(FilesetUsage {
            key: key.clone(),
            total_bytes,
            contributors,
        });
    }

    Ok(StorageReport {
        sponsor: sponsor.to_string(),
        filesets,
    })
}
