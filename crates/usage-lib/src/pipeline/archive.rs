//! Archival CSV of a finished run

use crate::error::Result;
use crate::models::SponsoredUsage;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Archive columns, in [`ArchiveRow`] field order
pub const ARCHIVE_HEADER: [&str; 14] = [
    "cluster",
    "sponsor",
    "netid",
    "name",
    "cpu-hours",
    "cpu-eff",
    "cpu-rank",
    "gpu-hours",
    "gpu-eff",
    "gpu-rank",
    "jobs",
    "accounts",
    "partition",
    "pool-key",
];

/// One archive line; missing sponsor and name are written as empty cells
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveRow {
    pub cluster: String,
    pub sponsor: Option<String>,
    pub netid: String,
    pub name: Option<String>,
    #[serde(rename = "cpu-hours")]
    pub cpu_hours: u64,
    #[serde(rename = "cpu-eff")]
    pub cpu_eff: String,
    #[serde(rename = "cpu-rank")]
    pub cpu_rank: String,
    #[serde(rename = "gpu-hours")]
    pub gpu_hours: u64,
    #[serde(rename = "gpu-eff")]
    pub gpu_eff: String,
    #[serde(rename = "gpu-rank")]
    pub gpu_rank: String,
    pub jobs: u64,
    pub accounts: String,
    pub partition: String,
    #[serde(rename = "pool-key")]
    pub pool_key: String,
}

impl From<&SponsoredUsage> for ArchiveRow {
    fn from(row: &SponsoredUsage) -> Self {
        let ranked = &row.ranked;
        let usage = &ranked.usage;
        Self {
            cluster: usage.pool.cluster.clone(),
            sponsor: row.sponsor.clone(),
            netid: usage.netid.clone(),
            name: row.name.clone(),
            cpu_hours: usage.cpu_hours,
            cpu_eff: ranked.efficiency.cpu_eff.to_string(),
            cpu_rank: ranked.cpu_rank.to_string(),
            gpu_hours: usage.gpu_hours,
            gpu_eff: ranked.efficiency.gpu_eff.to_string(),
            gpu_rank: ranked.gpu_rank.to_string(),
            jobs: usage.jobs,
            accounts: usage.accounts_joined(),
            partition: usage.partition.clone(),
            pool_key: usage.pool.as_key(),
        }
    }
}

/// Archive rows ordered by cluster, sponsor, CPU hours (descending), netid, pool
pub fn archive_rows(rows: &[SponsoredUsage]) -> Vec<ArchiveRow> {
    let mut out: Vec<ArchiveRow> = rows.iter().map(ArchiveRow::from).collect();
    out.sort_by(|a, b| {
        a.cluster
            .cmp(&b.cluster)
            .then_with(|| a.sponsor.cmp(&b.sponsor))
            .then_with(|| b.cpu_hours.cmp(&a.cpu_hours))
            .then_with(|| a.netid.cmp(&b.netid))
            .then_with(|| a.pool_key.cmp(&b.pool_key))
    });
    out
}

/// Header line first, even when there are no rows
pub fn write_archive<W: Write>(rows: &[ArchiveRow], writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(ARCHIVE_HEADER)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write next to `path` and rename into place, so readers never see a partial file
pub fn write_archive_file(rows: &[ArchiveRow], path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive.csv".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let file = std::fs::File::create(&tmp)?;
    if let Err(e) = write_archive(rows, file) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
