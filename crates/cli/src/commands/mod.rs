//! Subcommand implementations and their shared input loading

pub mod period;
pub mod run;
pub mod storage;

use anyhow::{Context, Result};
use tracing::info;
use usage_lib::identity::{DepartedUsersStrategy, LdifDirectory, UidResolution};
use usage_lib::Diagnostics;

use crate::config::{required, ReportConfig};

pub(crate) fn load_directory(
    config: &ReportConfig,
    diagnostics: &mut Diagnostics,
) -> Result<LdifDirectory> {
    let path = required(&config.directory_ldif, "directory_ldif")?;
    let directory = LdifDirectory::load(path, diagnostics)
        .with_context(|| format!("Failed to load directory from {}", path.display()))?;
    info!(entries = directory.len(), path = %path.display(), "Loaded directory snapshot");
    Ok(directory)
}

pub(crate) fn load_departed_users(
    config: &ReportConfig,
    diagnostics: &mut Diagnostics,
) -> Result<Option<DepartedUsersStrategy>> {
    let Some(path) = &config.departed_users_csv else {
        return Ok(None);
    };
    let departed = DepartedUsersStrategy::load(path, diagnostics)
        .with_context(|| format!("Failed to load departed users from {}", path.display()))?;
    info!(rows = departed.len(), "Loaded departed users");
    Ok(Some(departed))
}

/// Snapshot first, then the audit log; earlier mappings win
pub(crate) fn load_uids(
    config: &ReportConfig,
    diagnostics: &mut Diagnostics,
) -> Result<UidResolution> {
    let mut uids = UidResolution::new();
    if let Some(path) = &config.uid_snapshot {
        let added = uids
            .load_snapshot(path, diagnostics)
            .with_context(|| format!("Failed to load uid snapshot from {}", path.display()))?;
        info!(added = added, "Loaded uid snapshot");
    }
    if let Some(path) = &config.audit_log {
        let added = uids
            .load_audit_log(path, diagnostics)
            .with_context(|| format!("Failed to load audit log from {}", path.display()))?;
        info!(added = added, "Loaded audit log");
    }
    Ok(uids)
}
