//! Job telemetry snapshot decoding
//!
//! The scheduler attaches a jobstats summary to each finished job's admin
//! comment: `JS1:` followed by base64 of gzip-compressed JSON. Short jobs and
//! jobs without data carry `JS1:Short` / `JS1:None`.

use crate::models::TelemetrySnapshot;
use base64::{engine::general_purpose, Engine as _};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Read;

const PREFIX: &str = "JS1:";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown telemetry format")]
    UnknownFormat,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid gzip stream: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("invalid jobstats JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct JobStats {
    nodes: BTreeMap<String, NodeStats>,
}

#[derive(Debug, Deserialize)]
struct NodeStats {
    #[serde(default)]
    cpus: u32,
    /// CPU-seconds consumed on the node
    #[serde(default)]
    total_time: f64,
    /// Percent utilization per GPU index
    #[serde(default)]
    gpu_utilization: BTreeMap<String, f64>,
}

/// True when the raw field carries no snapshot at all
pub fn is_empty_snapshot(raw: &str) -> bool {
    let raw = raw.trim();
    match raw.strip_prefix(PREFIX) {
        Some(payload) => matches!(payload.trim(), "" | "None" | "Short"),
        None => raw.is_empty(),
    }
}

/// Decode a raw admin comment into used/total second pairs
///
/// `elapsed_seconds` is the job's wall-clock time; totals are allocated
/// capacity over that time. Returns `Ok(None)` for an empty snapshot.
pub fn decode_snapshot(
    raw: &str,
    elapsed_seconds: u64,
) -> Result<Option<TelemetrySnapshot>, TelemetryError> {
    if is_empty_snapshot(raw) {
        return Ok(None);
    }
    let payload = raw
        .trim()
        .strip_prefix(PREFIX)
        .ok_or(TelemetryError::UnknownFormat)?;

    let compressed = general_purpose::STANDARD.decode(payload.trim())?;
    let mut json = String::new();
    GzDecoder::new(compressed.as_slice()).read_to_string(&mut json)?;
    let stats: JobStats = serde_json::from_str(&json)?;

    let elapsed = elapsed_seconds as f64;
    let mut cpu_used = 0.0;
    let mut cpu_total = 0.0;
    let mut gpu_used = 0.0;
    let mut gpus = 0usize;

    for node in stats.nodes.values() {
        cpu_used += node.total_time;
        cpu_total += f64::from(node.cpus) * elapsed;
        for percent in node.gpu_utilization.values() {
            gpu_used += percent / 100.0 * elapsed;
            gpus += 1;
        }
    }

    let (gpu_used_seconds, gpu_total_seconds) = if gpus > 0 {
        (Some(gpu_used), Some(gpus as f64 * elapsed))
    } else {
        (None, None)
    };

    Ok(Some(TelemetrySnapshot {
        cpu_used_seconds: cpu_used,
        cpu_total_seconds: cpu_total,
        gpu_used_seconds,
        gpu_total_seconds,
    }))
}

/// Encode a jobstats JSON document the way the scheduler does
#[cfg(test)]
pub(crate) fn encode_jobstats(json: &str) -> String {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();
    format!("{}{}", PREFIX, general_purpose::STANDARD.encode(compressed))
}
