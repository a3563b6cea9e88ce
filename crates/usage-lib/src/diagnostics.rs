//! Non-fatal data-quality findings
//!
//! Bad rows never abort a run. Each problem is recorded here, logged once as it
//! is recorded, and the offending record is excluded only from the step that
//! cannot use it.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// One data-quality finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("job {jobid}: malformed resource spec {spec:?}")]
    MalformedResourceSpec { jobid: String, spec: String },

    #[error("duplicate {source_name} record {key}, keeping the first")]
    DuplicateRecord { source_name: String, key: String },

    #[error("missing identity for {netid}{}: {reason}", cluster_suffix(.cluster))]
    MissingIdentity {
        netid: String,
        cluster: Option<String>,
        reason: String,
    },

    #[error("{dropped} job(s) with used > total telemetry dropped from {pool_key}")]
    CorruptTelemetry { pool_key: String, dropped: usize },

    #[error("job {jobid}: undecodable telemetry ({reason})")]
    UndecodableTelemetry { jobid: String, reason: String },

    #[error("storage id {id} does not map to any netid")]
    UnresolvedId { id: String },

    #[error("{source_name}:{line}: unparsable line {text:?}")]
    MalformedLine {
        source_name: String,
        line: usize,
        text: String,
    },

    #[error("malformed metric sample: {detail}")]
    MalformedSample { detail: String },

    #[error("{netid} has multiple managers ({}), using {chosen}", .managers.join(","))]
    MultipleManagers {
        netid: String,
        managers: Vec<String>,
        chosen: String,
    },
}

fn cluster_suffix(cluster: &Option<String>) -> String {
    cluster
        .as_ref()
        .map(|c| format!(" on {}", c))
        .unwrap_or_default()
}

impl Diagnostic {
    /// Stable short name of the diagnostic kind
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MalformedResourceSpec { .. } => "malformed_resource_spec",
            Diagnostic::DuplicateRecord { .. } => "duplicate_record",
            Diagnostic::MissingIdentity { .. } => "missing_identity",
            Diagnostic::CorruptTelemetry { .. } => "corrupt_telemetry",
            Diagnostic::UndecodableTelemetry { .. } => "undecodable_telemetry",
            Diagnostic::UnresolvedId { .. } => "unresolved_id",
            Diagnostic::MalformedLine { .. } => "malformed_line",
            Diagnostic::MalformedSample { .. } => "malformed_sample",
            Diagnostic::MultipleManagers { .. } => "multiple_managers",
        }
    }
}

/// Run-scoped list of diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding and log it
    pub fn record(&mut self, diagnostic: Diagnostic) {
        warn!(event = "diagnostic", kind = diagnostic.kind(), "{}", diagnostic);
        self.items.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Number of findings of one kind
    pub fn count(&self, kind: &str) -> usize {
        self.items.iter().filter(|d| d.kind() == kind).count()
    }

    /// Findings per kind, ordered by kind name
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.items {
            *counts.entry(d.kind()).or_insert(0) += 1;
        }
        counts
    }
}

/// Fields of an undecodable record, with invalid bytes replaced
pub(crate) fn lossy_join<'a>(fields: impl Iterator<Item = &'a [u8]>, separator: &str) -> String {
    fields
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Numbered lines of a text file, skipping those that are not UTF-8
///
/// Each skipped line is recorded as `MalformedLine`. Numbering starts at 1
/// and counts skipped lines, so it matches the file.
pub(crate) fn utf8_lines<'a>(
    bytes: &'a [u8],
    source_name: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<(usize, &'a str)> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);

    let mut lines = Vec::new();
    for (index, raw) in body.split(|b| *b == b'\n').enumerate() {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        match std::str::from_utf8(raw) {
            Ok(line) => lines.push((index + 1, line)),
            Err(_) => diagnostics.record(Diagnostic::MalformedLine {
                source_name: source_name.to_string(),
                line: index + 1,
                text: String::from_utf8_lossy(raw).into_owned(),
            }),
        }
    }
    lines
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
