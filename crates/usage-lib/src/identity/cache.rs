//! Run-scoped memo of directory lookups
//!
//! Every directory question asked during a run goes through one [`RunCache`].
//! Each netid and each numeric id reaches the directory at most once; the cache
//! is dropped with the run.

use super::directory::{Directory, DirectoryEntry};
use super::resolver::SponsorResolver;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::models::SponsorRecord;
use std::collections::HashMap;
use tracing::warn;

pub struct RunCache<'a> {
    directory: &'a dyn Directory,
    resolver: SponsorResolver,
    entries: HashMap<String, Option<DirectoryEntry>>,
    records: HashMap<String, SponsorRecord>,
    ids: HashMap<String, Option<String>>,
    lookups: usize,
}

impl<'a> RunCache<'a> {
    pub fn new(directory: &'a dyn Directory, resolver: SponsorResolver) -> Self {
        Self {
            directory,
            resolver,
            entries: HashMap::new(),
            records: HashMap::new(),
            ids: HashMap::new(),
            lookups: 0,
        }
    }

    fn entry(&mut self, netid: &str) -> Result<Option<DirectoryEntry>> {
        if let Some(entry) = self.entries.get(netid) {
            return Ok(entry.clone());
        }
        self.lookups += 1;
        let entry = self.directory.entry(netid)?;
        self.entries.insert(netid.to_string(), entry.clone());
        Ok(entry)
    }

    /// Sponsor record for a netid, resolved on first request
    pub fn sponsor_record(
        &mut self,
        netid: &str,
        diagnostics: &mut Diagnostics,
    ) -> Result<SponsorRecord> {
        if let Some(record) = self.records.get(netid) {
            return Ok(record.clone());
        }
        let entry = self.entry(netid)?;
        let record = self.resolver.resolve(netid, entry.as_ref(), diagnostics);
        self.records.insert(netid.to_string(), record.clone());
        Ok(record)
    }

    /// Unshortened display name of a sponsor
    pub fn sponsor_full_name(&mut self, netid: &str) -> Result<Option<String>> {
        let name = self.entry(netid)?.and_then(|e| e.displayname);
        if name.is_none() {
            warn!(event = "sponsor_name_missing", sponsor = %netid, "Name not found for sponsor");
        }
        Ok(name)
    }

    /// Netid that owns a numeric id
    pub fn netid_for_id(&mut self, id: &str) -> Result<Option<String>> {
        if let Some(netid) = self.ids.get(id) {
            return Ok(netid.clone());
        }
        self.lookups += 1;
        let netid = self.directory.name_for_id(id)?;
        self.ids.insert(id.to_string(), netid.clone());
        Ok(netid)
    }

    /// Number of queries that reached the directory
    pub fn directory_lookups(&self) -> usize {
        self.lookups
    }
}
