//! GPU classification from allocated trackable resources
//!
//! Allocation specs look like `billing=112,cpu=112,gres/gpu=16,mem=33600M,node=4`.

use crate::error::{Result, UsageError};

const GPU_KEY: &str = "gres/gpu";

/// Value of the untyped `gres/gpu` key, if present
fn gpu_value(alloc_resources: &str) -> Option<&str> {
    alloc_resources
        .split(',')
        .filter_map(|part| part.split_once('='))
        .filter(|(key, _)| key.trim() == GPU_KEY)
        .map(|(_, value)| value.trim())
        .last()
}

/// Number of GPUs allocated to a job
///
/// Returns 0 when no `gres/gpu` key is present. A present key must carry a
/// positive integer.
pub fn gpu_units(alloc_resources: &str) -> Result<u32> {
    let Some(value) = gpu_value(alloc_resources) else {
        return Ok(0);
    };

    let malformed = |reason: &str| UsageError::MalformedResourceSpec {
        spec: alloc_resources.to_string(),
        reason: reason.to_string(),
    };

    let gpus: u32 = value
        .parse()
        .map_err(|_| malformed("gres/gpu is not an integer"))?;
    if gpus == 0 {
        return Err(malformed("gres/gpu must be positive"));
    }
    Ok(gpus)
}

/// True iff a nonzero `gres/gpu` key is present
pub fn is_gpu_job(alloc_resources: &str) -> bool {
    gpu_value(alloc_resources)
        .and_then(|v| v.parse::<u32>().ok())
        .map(|gpus| gpus > 0)
        .unwrap_or(false)
}
