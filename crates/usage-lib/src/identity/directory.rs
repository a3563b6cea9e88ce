//! Directory entries and the LDIF snapshot adapter
//!
//! The directory dump is LDIF as printed by `ldapsearch`: one `attr: value`
//! per line, folded lines continue with a single leading space, `#` lines are
//! comments and entries are separated by blank lines. Each physical line is
//! tagged before anything is built from it, so a bad line becomes a
//! diagnostic instead of poisoning the entry it sits in.

use crate::diagnostics::{utf8_lines, Diagnostic, Diagnostics};
use crate::error::{Result, UsageError};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// The attributes the engine reads from one directory entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub uid: String,
    pub uid_number: Option<String>,
    pub displayname: Option<String>,
    /// Manager netids in entry order, taken from the `uid=` RDN of each DN
    pub managers: Vec<String>,
    /// Free-text `description` values carrying per-cluster overrides
    pub descriptions: Vec<String>,
}

/// Read access to the identity directory
pub trait Directory {
    /// Entry for a netid, `None` when the directory has no such user
    fn entry(&self, netid: &str) -> Result<Option<DirectoryEntry>>;

    /// Netid owning a numeric id
    fn name_for_id(&self, id: &str) -> Result<Option<String>>;
}

/// One tagged physical line
#[derive(Debug, PartialEq, Eq)]
enum LdifLine<'a> {
    Blank,
    Comment,
    Continuation(&'a str),
    Attribute(&'a str, &'a str),
    Malformed,
}

fn tag_line(line: &str) -> LdifLine<'_> {
    if line.trim().is_empty() {
        return LdifLine::Blank;
    }
    if line.starts_with('#') {
        return LdifLine::Comment;
    }
    if let Some(rest) = line.strip_prefix(' ') {
        return LdifLine::Continuation(rest);
    }
    match line.split_once(':') {
        Some((name, value)) if is_attribute_name(name) => LdifLine::Attribute(name, value),
        _ => LdifLine::Malformed,
    }
}

fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';')
}

/// Attribute value with its encoding marker still attached
#[derive(Debug)]
struct RawAttribute {
    name: String,
    value: String,
    line: usize,
}

impl RawAttribute {
    /// `attr: text` or `attr:: base64`
    fn decode(&self) -> Option<String> {
        match self.value.strip_prefix(':') {
            Some(encoded) => STANDARD
                .decode(encoded.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
            None => Some(self.value.trim().to_string()),
        }
    }
}

/// Netid from a manager DN such as `uid=curt,cn=users,dc=rc,dc=princeton,dc=edu`
pub fn uid_from_dn(dn: &str) -> Option<&str> {
    dn.split(',').find_map(|rdn| {
        let (attr, value) = rdn.trim().split_once('=')?;
        (attr.eq_ignore_ascii_case("uid") && !value.trim().is_empty()).then(|| value.trim())
    })
}

/// Directory loaded from an LDIF dump
#[derive(Debug, Clone, Default)]
pub struct LdifDirectory {
    entries: BTreeMap<String, DirectoryEntry>,
    netid_by_number: BTreeMap<String, String>,
}

impl LdifDirectory {
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| UsageError::read(path, e))?;
        Ok(Self::parse_bytes(&bytes, &path.display().to_string(), diagnostics))
    }

    pub fn parse(text: &str, source_name: &str, diagnostics: &mut Diagnostics) -> Self {
        let lines = text.lines().enumerate().map(|(index, line)| (index + 1, line));
        Self::from_lines(lines, source_name, diagnostics)
    }

    /// Like [`LdifDirectory::parse`], reporting lines that are not UTF-8
    pub fn parse_bytes(bytes: &[u8], source_name: &str, diagnostics: &mut Diagnostics) -> Self {
        let lines = utf8_lines(bytes, source_name, diagnostics);
        Self::from_lines(lines, source_name, diagnostics)
    }

    fn from_lines<'t>(
        lines: impl IntoIterator<Item = (usize, &'t str)>,
        source_name: &str,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut directory = Self::default();
        let mut block: Vec<RawAttribute> = Vec::new();

        for (line_no, line) in lines {
            match tag_line(line) {
                LdifLine::Blank => directory.finish_entry(&mut block, source_name, diagnostics),
                LdifLine::Comment => {}
                LdifLine::Continuation(rest) => match block.last_mut() {
                    Some(attr) => attr.value.push_str(rest),
                    None => diagnostics.record(Diagnostic::MalformedLine {
                        source_name: source_name.to_string(),
                        line: line_no,
                        text: line.to_string(),
                    }),
                },
                LdifLine::Attribute(name, value) => block.push(RawAttribute {
                    name: name.to_ascii_lowercase(),
                    value: value.to_string(),
                    line: line_no,
                }),
                LdifLine::Malformed => diagnostics.record(Diagnostic::MalformedLine {
                    source_name: source_name.to_string(),
                    line: line_no,
                    text: line.to_string(),
                }),
            }
        }
        directory.finish_entry(&mut block, source_name, diagnostics);

        debug!(
            entries = directory.entries.len(),
            source = %source_name,
            "Loaded directory snapshot"
        );
        directory
    }

    fn finish_entry(
        &mut self,
        block: &mut Vec<RawAttribute>,
        source_name: &str,
        diagnostics: &mut Diagnostics,
    ) {
        if block.is_empty() {
            return;
        }
        let mut entry = DirectoryEntry::default();

        for attr in block.drain(..) {
            let Some(value) = attr.decode() else {
                diagnostics.record(Diagnostic::MalformedLine {
                    source_name: source_name.to_string(),
                    line: attr.line,
                    text: format!("{}:{}", attr.name, attr.value),
                });
                continue;
            };
            match attr.name.as_str() {
                "uid" if entry.uid.is_empty() => entry.uid = value,
                "uidnumber" => entry.uid_number = Some(value),
                "displayname" => entry.displayname = Some(value).filter(|v| !v.is_empty()),
                "manager" => match uid_from_dn(&value) {
                    Some(netid) => entry.managers.push(netid.to_string()),
                    None => debug!(dn = %value, "Ignoring manager without uid RDN"),
                },
                "description" => entry.descriptions.push(value),
                _ => {}
            }
        }

        // search/result footers of an ldapsearch dump carry no uid
        if entry.uid.is_empty() {
            return;
        }
        if self.entries.contains_key(&entry.uid) {
            diagnostics.record(Diagnostic::DuplicateRecord {
                source_name: "directory".to_string(),
                key: entry.uid,
            });
            return;
        }
        if let Some(number) = &entry.uid_number {
            self.netid_by_number
                .entry(number.clone())
                .or_insert_with(|| entry.uid.clone());
        }
        self.entries.insert(entry.uid.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Directory for LdifDirectory {
    fn entry(&self, netid: &str) -> Result<Option<DirectoryEntry>> {
        Ok(self.entries.get(netid).cloned())
    }

    fn name_for_id(&self, id: &str) -> Result<Option<String>> {
        Ok(self.netid_by_number.get(id).cloned())
    }
}
