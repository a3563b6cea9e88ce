//! Sponsor resolution
//!
//! The primary sponsor comes from an ordered list of strategies where the
//! first match wins; an identity no strategy can place stays unresolved and
//! is reported. Per-cluster overrides from the directory entry are applied on
//! top of the primary sponsor.

use super::directory::DirectoryEntry;
use super::overrides::parse_overrides;
use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{Result, UsageError};
use crate::models::{SponsorRecord, SponsorSource};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Primary sponsor found by one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimarySponsor {
    pub sponsor: String,
    /// Name known to the strategy, used when the directory has none
    pub displayname: Option<String>,
    pub source: SponsorSource,
}

/// One step of the primary-sponsor fallback chain
pub trait SponsorStrategy {
    fn name(&self) -> &'static str;

    fn primary(
        &self,
        netid: &str,
        entry: Option<&DirectoryEntry>,
        diagnostics: &mut Diagnostics,
    ) -> Option<PrimarySponsor>;
}

/// First `manager` of the directory entry
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryManagerStrategy;

impl SponsorStrategy for DirectoryManagerStrategy {
    fn name(&self) -> &'static str {
        "directory_manager"
    }

    fn primary(
        &self,
        netid: &str,
        entry: Option<&DirectoryEntry>,
        diagnostics: &mut Diagnostics,
    ) -> Option<PrimarySponsor> {
        let managers = &entry?.managers;
        let chosen = managers.first()?.clone();
        if managers.len() > 1 {
            diagnostics.record(Diagnostic::MultipleManagers {
                netid: netid.to_string(),
                managers: managers.clone(),
                chosen: chosen.clone(),
            });
        }
        Some(PrimarySponsor {
            sponsor: chosen,
            displayname: None,
            source: SponsorSource::DirectoryManager,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DepartedRow {
    #[serde(rename = "Netid_")]
    netid: String,
    #[serde(rename = "Sponsor_Netid_")]
    sponsor: String,
    #[serde(rename = "Name_", default)]
    name: Option<String>,
}

/// Historical sponsor list for users who have left
#[derive(Debug, Clone, Default)]
pub struct DepartedUsersStrategy {
    rows: BTreeMap<String, (String, Option<String>)>,
}

impl DepartedUsersStrategy {
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let file = File::open(path).map_err(|e| UsageError::read(path, e))?;
        Self::from_reader(file, &path.display().to_string(), diagnostics)
    }

    /// Read `Netid_,Sponsor_Netid_,Name_` rows; the first row for a netid wins
    pub fn from_reader<R: Read>(
        reader: R,
        source_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let mut rows = BTreeMap::new();

        for (index, result) in rdr.deserialize::<DepartedRow>().enumerate() {
            let row = match result {
                Ok(row) if !row.netid.is_empty() && !row.sponsor.is_empty() => row,
                Ok(row) => {
                    diagnostics.record(Diagnostic::MalformedLine {
                        source_name: source_name.to_string(),
                        line: index + 2,
                        text: format!("{},{}", row.netid, row.sponsor),
                    });
                    continue;
                }
                Err(e) => {
                    let line = e
                        .position()
                        .map(|p| p.line() as usize)
                        .unwrap_or(index + 2);
                    diagnostics.record(Diagnostic::MalformedLine {
                        source_name: source_name.to_string(),
                        line,
                        text: e.to_string(),
                    });
                    continue;
                }
            };
            if rows.contains_key(&row.netid) {
                diagnostics.record(Diagnostic::DuplicateRecord {
                    source_name: "departed_users".to_string(),
                    key: row.netid,
                });
                continue;
            }
            let name = row.name.filter(|n| !n.is_empty());
            rows.insert(row.netid, (row.sponsor, name));
        }

        debug!(rows = rows.len(), source = %source_name, "Loaded departed users");
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SponsorStrategy for DepartedUsersStrategy {
    fn name(&self) -> &'static str {
        "departed_users"
    }

    fn primary(
        &self,
        netid: &str,
        _entry: Option<&DirectoryEntry>,
        _diagnostics: &mut Diagnostics,
    ) -> Option<PrimarySponsor> {
        let (sponsor, name) = self.rows.get(netid)?;
        warn!(
            event = "sponsor_from_departed_users",
            netid = %netid,
            sponsor = %sponsor,
            "Primary sponsor taken from departed users list"
        );
        Some(PrimarySponsor {
            sponsor: sponsor.clone(),
            displayname: name.clone(),
            source: SponsorSource::DepartedUsers,
        })
    }
}

/// Builds a [`SponsorRecord`] from a directory entry
pub struct SponsorResolver {
    strategies: Vec<Box<dyn SponsorStrategy>>,
    clusters: Vec<String>,
    self_sentinel: String,
    corrected_names: BTreeMap<String, String>,
}

impl SponsorResolver {
    pub fn new(config: &EngineConfig, strategies: Vec<Box<dyn SponsorStrategy>>) -> Self {
        Self {
            strategies,
            clusters: config.clusters.clone(),
            self_sentinel: config.self_sponsor_sentinel.clone(),
            corrected_names: config.corrected_full_names.iter().cloned().collect(),
        }
    }

    /// Directory managers, then the departed-users list when one is given
    pub fn with_defaults(config: &EngineConfig, departed: Option<DepartedUsersStrategy>) -> Self {
        let mut strategies: Vec<Box<dyn SponsorStrategy>> =
            vec![Box::new(DirectoryManagerStrategy)];
        if let Some(departed) = departed {
            strategies.push(Box::new(departed));
        }
        Self::new(config, strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn resolve(
        &self,
        netid: &str,
        entry: Option<&DirectoryEntry>,
        diagnostics: &mut Diagnostics,
    ) -> SponsorRecord {
        let primary = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.primary(netid, entry, diagnostics));

        if primary.is_none() {
            diagnostics.record(Diagnostic::MissingIdentity {
                netid: netid.to_string(),
                cluster: None,
                reason: "no primary sponsor in directory or departed users list".to_string(),
            });
        }

        let displayname = self
            .corrected_names
            .get(netid)
            .cloned()
            .or_else(|| entry.and_then(|e| e.displayname.clone()))
            .or_else(|| primary.as_ref().and_then(|p| p.displayname.clone()));
        if displayname.is_none() {
            warn!(event = "display_name_missing", netid = %netid, "Name not found for user");
        }

        let description = entry
            .map(|e| e.descriptions.join(" "))
            .unwrap_or_default();
        let overrides = parse_overrides(&description, netid, &self.clusters, &self.self_sentinel);

        let sponsors = self
            .clusters
            .iter()
            .map(|cluster| {
                let sponsor = overrides
                    .get(cluster)
                    .cloned()
                    .or_else(|| primary.as_ref().map(|p| p.sponsor.clone()));
                (cluster.clone(), sponsor)
            })
            .collect();

        SponsorRecord {
            netid: netid.to_string(),
            sponsors,
            displayname,
            source: primary
                .map(|p| p.source)
                .unwrap_or(SponsorSource::Unresolved),
        }
    }
}
