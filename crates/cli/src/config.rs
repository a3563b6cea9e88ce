//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use usage_lib::EngineConfig;

/// Prefix of environment overrides, e.g. `SPONSOR_USAGE__ARCHIVE_PATH`
const ENV_PREFIX: &str = "SPONSOR_USAGE";

/// Report inputs, outputs and engine parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Pipe-delimited accounting export
    pub accounting_export: Option<PathBuf>,
    /// LDIF dump of the directory
    pub directory_ldif: Option<PathBuf>,
    /// CSV of users who have left, with their last sponsor
    pub departed_users_csv: Option<PathBuf>,
    /// `uid,netid` snapshot for storage id resolution
    pub uid_snapshot: Option<PathBuf>,
    /// Account-creation audit log for storage id resolution
    pub audit_log: Option<PathBuf>,
    /// Directory of saved metrics query responses
    pub metrics_dir: Option<PathBuf>,
    /// Archive CSV written after a successful run
    pub archive_path: Option<PathBuf>,
    /// Prometheus textfile-collector output
    pub metrics_textfile: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl ReportConfig {
    /// Load from the given file, or the default location if it exists,
    /// with environment variables layered on top
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        match explicit {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// `~/.config/sponsor-usage/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        let home = dirs_next::home_dir()?;
        Some(home.join(".config").join("sponsor-usage").join("config.toml"))
    }
}

/// A path the command cannot run without
pub fn required<'a>(path: &'a Option<PathBuf>, key: &str) -> Result<&'a Path> {
    path.as_deref().with_context(|| {
        format!(
            "`{}` is not configured (set it in the config file or {}__{})",
            key,
            ENV_PREFIX,
            key.to_uppercase()
        )
    })
}
