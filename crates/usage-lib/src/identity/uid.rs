//! Numeric id to netid resolution for storage samples
//!
//! Sources are merged in order and an id already mapped keeps its first netid:
//! the current uid snapshot, then ids recovered from the account audit log,
//! then single-id directory queries for whatever is still unknown.

use super::cache::RunCache;
use crate::diagnostics::{lossy_join, utf8_lines, Diagnostic, Diagnostics};
use crate::error::{Result, UsageError};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

fn audit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)added user\s+(?P<netid>[A-Za-z0-9_.-]+)\s*\((?:uid|id)\s*[=:]?\s*(?P<id>\d+)\)")
            .expect("audit pattern is valid")
    })
}

/// What one audit-log line says about account creation
#[derive(Debug, PartialEq, Eq)]
enum AuditLine<'a> {
    Added { netid: &'a str, id: &'a str },
    /// Mentions an added user but the id cannot be read
    Unreadable,
    Unrelated,
}

fn tag_audit_line(line: &str) -> AuditLine<'_> {
    if let Some(caps) = audit_pattern().captures(line) {
        if let (Some(netid), Some(id)) = (caps.name("netid"), caps.name("id")) {
            return AuditLine::Added {
                netid: netid.as_str(),
                id: id.as_str(),
            };
        }
    }
    if line.to_ascii_lowercase().contains("added user") {
        AuditLine::Unreadable
    } else {
        AuditLine::Unrelated
    }
}

/// Bidirectional numeric id ↔ netid map for one run
#[derive(Debug, Clone, Default)]
pub struct UidResolution {
    by_id: BTreeMap<String, String>,
    by_netid: BTreeMap<String, String>,
}

impl UidResolution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping unless the id is already known
    pub fn insert(&mut self, id: &str, netid: &str) -> bool {
        if self.by_id.contains_key(id) {
            return false;
        }
        self.by_id.insert(id.to_string(), netid.to_string());
        self.by_netid
            .entry(netid.to_string())
            .or_insert_with(|| id.to_string());
        true
    }

    pub fn netid(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn id_for(&self, netid: &str) -> Option<&str> {
        self.by_netid.get(netid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn load_snapshot(&mut self, path: &Path, diagnostics: &mut Diagnostics) -> Result<usize> {
        let file = File::open(path).map_err(|e| UsageError::read(path, e))?;
        self.merge_snapshot(file, &path.display().to_string(), diagnostics)
    }

    /// Merge headerless `uid,username` rows, returning how many were added
    ///
    /// Root and rows with an empty field are skipped.
    pub fn merge_snapshot<R: Read>(
        &mut self,
        reader: R,
        source_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<usize> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut added = 0;

        for (index, row) in rdr.byte_records().enumerate() {
            let row = row?;
            let line = row
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(index + 1);
            let row = match csv::StringRecord::from_byte_record(row) {
                Ok(row) => row,
                Err(e) => {
                    diagnostics.record(Diagnostic::MalformedLine {
                        source_name: source_name.to_string(),
                        line,
                        text: lossy_join(e.into_byte_record().iter(), ","),
                    });
                    continue;
                }
            };
            if row.len() != 2 {
                diagnostics.record(Diagnostic::MalformedLine {
                    source_name: source_name.to_string(),
                    line,
                    text: row.iter().collect::<Vec<_>>().join(","),
                });
                continue;
            }
            let (id, netid) = (&row[0], &row[1]);
            if id.is_empty() || netid.is_empty() || id == "0" {
                continue;
            }
            if self.insert(id, netid) {
                added += 1;
            } else if self.netid(id) != Some(netid) {
                diagnostics.record(Diagnostic::DuplicateRecord {
                    source_name: "uid_snapshot".to_string(),
                    key: id.to_string(),
                });
            }
        }

        debug!(added = added, source = %source_name, "Merged uid snapshot");
        Ok(added)
    }

    pub fn load_audit_log(&mut self, path: &Path, diagnostics: &mut Diagnostics) -> Result<usize> {
        let bytes = std::fs::read(path).map_err(|e| UsageError::read(path, e))?;
        Ok(self.merge_audit_log(&bytes, &path.display().to_string(), diagnostics))
    }

    /// Merge ids found in `added user <netid> (id <n>)` lines
    ///
    /// Lines that are not UTF-8 are reported and skipped.
    pub fn merge_audit_log(
        &mut self,
        bytes: &[u8],
        source_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> usize {
        let mut added = 0;
        for (line_no, line) in utf8_lines(bytes, source_name, diagnostics) {
            match tag_audit_line(line) {
                AuditLine::Added { netid, id } => {
                    if self.insert(id, netid) {
                        added += 1;
                    }
                }
                AuditLine::Unreadable => diagnostics.record(Diagnostic::MalformedLine {
                    source_name: source_name.to_string(),
                    line: line_no,
                    text: line.to_string(),
                }),
                AuditLine::Unrelated => {}
            }
        }
        debug!(added = added, source = %source_name, "Merged audit log");
        added
    }

    /// Netid for an id, asking the directory once when no source knows it
    pub fn resolve(&mut self, id: &str, cache: &mut RunCache<'_>) -> Result<Option<String>> {
        if let Some(netid) = self.netid(id) {
            return Ok(Some(netid.to_string()));
        }
        let netid = cache.netid_for_id(id)?;
        if let Some(netid) = &netid {
            self.insert(id, netid);
        }
        Ok(netid)
    }
}
