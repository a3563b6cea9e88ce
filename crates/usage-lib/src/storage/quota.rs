//! Storage quota samples keyed by numeric id

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Result, UsageError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Bytes used per (id, fileset) quota entry
pub const QUOTA_USAGE_METRIC: &str = "gpfs_quota_block_usage_bytes";

/// One instant-vector sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSample {
    pub labels: BTreeMap<String, String>,
    pub value: String,
}

/// Source of metric samples
pub trait MetricsSource {
    fn query(&self, metric: &str) -> Result<Vec<MetricSample>>;
}

#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<PromData>,
}

#[derive(Debug, Deserialize)]
struct PromData {
    #[serde(default)]
    result: Vec<PromResult>,
}

#[derive(Debug, Deserialize)]
struct PromResult {
    metric: BTreeMap<String, String>,
    /// `[timestamp, "value"]`
    value: (serde_json::Value, String),
}

/// Parse a saved `/api/v1/query` response body
pub fn parse_prom_response(body: &str) -> Result<Vec<MetricSample>> {
    let response: PromResponse = serde_json::from_str(body)?;
    if response.status != "success" {
        return Err(UsageError::Collaborator {
            collaborator: "metrics",
            message: response
                .error
                .unwrap_or_else(|| format!("status {}", response.status)),
        });
    }
    Ok(response
        .data
        .map(|d| d.result)
        .unwrap_or_default()
        .into_iter()
        .map(|r| MetricSample {
            labels: r.metric,
            value: r.value.1,
        })
        .collect())
}

/// Directory of saved query responses, one `<metric>.json` per metric
#[derive(Debug, Clone)]
pub struct PromSnapshotDir {
    dir: PathBuf,
}

impl PromSnapshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MetricsSource for PromSnapshotDir {
    fn query(&self, metric: &str) -> Result<Vec<MetricSample>> {
        let path = self.dir.join(format!("{}.json", metric));
        let body = std::fs::read_to_string(&path).map_err(|e| UsageError::read(&path, e))?;
        parse_prom_response(&body)
    }
}

fn parse_bytes(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().or_else(|| {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round_ties_even() as u64)
    })
}

/// Per-id storage usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageQuota {
    usage: BTreeMap<String, BTreeMap<String, u64>>,
}

impl StorageQuota {
    /// Key samples by id and fileset
    ///
    /// User samples carry a `uid` label and are keyed `fs.filesetname`. Group
    /// and fileset samples have no uid; the fileset name stands in for the id
    /// and the key gains the `gid` when present. The first sample for a key
    /// wins.
    pub fn from_samples(samples: Vec<MetricSample>, diagnostics: &mut Diagnostics) -> Self {
        let mut quota = Self::default();

        for sample in samples {
            let labels = &sample.labels;
            let malformed = |detail: &str| Diagnostic::MalformedSample {
                detail: format!("{} {:?}", detail, labels),
            };

            let (Some(fs), Some(fileset)) = (labels.get("fs"), labels.get("filesetname")) else {
                diagnostics.record(malformed("no fs or filesetname"));
                continue;
            };
            let base = format!("{}.{}", fs, fileset);

            let (id, key) = if let Some(uid) = labels.get("uid") {
                (uid.clone(), base)
            } else if matches!(
                labels.get("quota_type").map(String::as_str),
                Some("GRP") | Some("FILESET")
            ) {
                let key = match labels.get("gid") {
                    Some(gid) => format!("{}.{}", base, gid),
                    None => base,
                };
                (fileset.clone(), key)
            } else {
                diagnostics.record(malformed("neither user nor group sample"));
                continue;
            };

            let Some(bytes) = parse_bytes(&sample.value) else {
                diagnostics.record(malformed(&format!("bad value {:?}", sample.value)));
                continue;
            };

            let entries = quota.usage.entry(id.clone()).or_default();
            if entries.contains_key(&key) {
                diagnostics.record(Diagnostic::DuplicateRecord {
                    source_name: "storage_quota".to_string(),
                    key: format!("{}/{}", id, key),
                });
                continue;
            }
            entries.insert(key, bytes);
        }

        debug!(ids = quota.usage.len(), "Built storage quota table");
        quota
    }

    pub fn get(&self, id: &str) -> Option<&BTreeMap<String, u64>> {
        self.usage.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.usage.keys().map(String::as_str)
    }

    /// `(id, bytes)` for every id with usage under `key`
    pub fn usage_under(&self, key: &str) -> Vec<(&str, u64)> {
        self.usage
            .iter()
            .filter_map(|(id, entries)| entries.get(key).map(|b| (id.as_str(), *b)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }
}
