//! Per-cluster sponsor overrides from the directory `description` attribute
//!
//! Grammar: `cluster:sponsor(optional note)`, entries usually separated by
//! `=`, for example `della:curt=tiger:USER=stellar:bob(until 2024)`.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::info;

fn override_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?P<cluster>[A-Za-z][A-Za-z0-9_-]*):(?P<sponsor>[A-Za-z0-9_.-]+)(?:\s*\((?P<note>[^)]*)\))?",
        )
        .expect("override pattern is valid")
    })
}

/// Parse cluster overrides for `netid` out of free text
///
/// Only `clusters` are considered and the first mention of a cluster wins.
/// The `self_sentinel` sponsor is rewritten to `netid`; notes are dropped.
pub fn parse_overrides(
    text: &str,
    netid: &str,
    clusters: &[String],
    self_sentinel: &str,
) -> BTreeMap<String, String> {
    let mut overrides = BTreeMap::new();

    for caps in override_pattern().captures_iter(text) {
        let cluster = &caps["cluster"];
        if !clusters.iter().any(|c| c == cluster) || overrides.contains_key(cluster) {
            continue;
        }
        let mut sponsor = caps["sponsor"].to_string();
        if sponsor == self_sentinel {
            info!(
                event = "sponsor_override_corrected",
                netid = %netid,
                cluster = %cluster,
                found = %sponsor,
                "Self-sponsor entry rewritten to the user"
            );
            sponsor = netid.to_string();
        }
        if let Some(note) = caps.name("note") {
            info!(
                event = "sponsor_override_corrected",
                netid = %netid,
                cluster = %cluster,
                note = %note.as_str(),
                "Annotation stripped from sponsor entry"
            );
        }
        overrides.insert(cluster.to_string(), sponsor);
    }
    overrides
}
