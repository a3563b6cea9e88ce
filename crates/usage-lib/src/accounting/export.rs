//! Accounting export reader
//!
//! Reads the pipe-delimited, headerless output of
//! `sacct -L -a -X -P -n -o jobid,user,cluster,account,partition,cputimeraw,elapsedraw,alloctres,start,admincomment`.

use super::AccountingSource;
use crate::diagnostics::{lossy_join, Diagnostic, Diagnostics};
use crate::error::{Result, UsageError};
use crate::models::JobRecord;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Field order of the export
pub const EXPORT_FIELDS: &str =
    "jobid,user,cluster,account,partition,cputimeraw,elapsedraw,alloctres,start,admincomment";

const MIN_FIELDS: usize = 9;

/// Export file produced by the accounting collaborator
#[derive(Debug, Clone)]
pub struct SacctExportFile {
    path: PathBuf,
}

impl SacctExportFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccountingSource for SacctExportFile {
    fn fetch(&self, diagnostics: &mut Diagnostics) -> Result<Vec<JobRecord>> {
        let file = File::open(&self.path).map_err(|e| UsageError::read(&self.path, e))?;
        let source_name = self.path.display().to_string();
        read_export(file, &source_name, diagnostics)
    }
}

/// Parse export rows, skipping pending jobs and recording malformed lines
pub fn read_export<R: Read>(
    reader: R,
    source_name: &str,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<JobRecord>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut records = Vec::new();
    let mut pending = 0usize;

    for (index, row) in rdr.byte_records().enumerate() {
        let row = row?;
        let line = row
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        let row = match StringRecord::from_byte_record(row) {
            Ok(row) => row,
            Err(e) => {
                diagnostics.record(Diagnostic::MalformedLine {
                    source_name: source_name.to_string(),
                    line,
                    text: lossy_join(e.into_byte_record().iter(), "|"),
                });
                continue;
            }
        };

        match parse_row(&row) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => pending += 1,
            Err(()) => diagnostics.record(Diagnostic::MalformedLine {
                source_name: source_name.to_string(),
                line,
                text: row.iter().collect::<Vec<_>>().join("|"),
            }),
        }
    }

    debug!(
        records = records.len(),
        pending = pending,
        source = %source_name,
        "Read accounting export"
    );
    Ok(records)
}

/// `Ok(None)` for jobs that never received an allocation
fn parse_row(row: &StringRecord) -> std::result::Result<Option<JobRecord>, ()> {
    if row.len() < MIN_FIELDS {
        return Err(());
    }
    let field = |i: usize| row.get(i).unwrap_or("").trim();

    let alloc_resources = field(7);
    if alloc_resources.is_empty() {
        return Ok(None);
    }

    let cpu_seconds = field(5).parse::<u64>().map_err(|_| ())?;
    let elapsed_seconds = field(6).parse::<u64>().map_err(|_| ())?;
    let start_time = match field(8) {
        "" | "Unknown" | "None" => None,
        ts => Some(ts.parse::<i64>().map_err(|_| ())?),
    };

    Ok(Some(JobRecord {
        jobid: field(0).to_string(),
        netid: field(1).to_string(),
        cluster: field(2).to_string(),
        account: field(3).to_string(),
        partition: field(4).to_string(),
        cpu_seconds,
        elapsed_seconds,
        alloc_resources: alloc_resources.to_string(),
        start_time,
        telemetry: field(9).to_string(),
    }))
}
