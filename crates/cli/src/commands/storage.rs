//! Storage usage for one sponsor

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;
use usage_lib::storage::{format_bytes, PromSnapshotDir, UNKNOWN_NETID};
use usage_lib::{Diagnostics, Pipeline, StructuredLogger};

use super::{load_directory, load_uids};
use crate::config::{required, ReportConfig};
use crate::output::{print_json, print_table, print_warning, OutputFormat};

/// Row for a fileset table
#[derive(Tabled)]
struct ContributorRow {
    #[tabled(rename = "NetID")]
    netid: String,
    #[tabled(rename = "Usage")]
    usage: String,
}

pub fn show_storage(config: &ReportConfig, sponsor: &str, format: OutputFormat) -> Result<()> {
    let mut load_diagnostics = Diagnostics::new();
    let directory = load_directory(config, &mut load_diagnostics)?;
    let uids = load_uids(config, &mut load_diagnostics)?;
    let metrics = PromSnapshotDir::new(required(&config.metrics_dir, "metrics_dir")?);

    let pipeline = Pipeline::new(config.engine.clone(), StructuredLogger::new(sponsor));
    let (report, diagnostics) = pipeline.storage_for_sponsor(sponsor, &directory, uids, &metrics)?;

    if let OutputFormat::Json = format {
        return print_json(&report);
    }

    println!("{} {}", "Storage".bold(), sponsor.cyan());
    println!("{}", "=".repeat(50));
    if report.filesets.is_empty() {
        print_warning(&format!("No filesets configured for {}", sponsor));
        return Ok(());
    }

    for fileset in &report.filesets {
        println!();
        println!("{} ({})", fileset.key.bold(), format_bytes(fileset.total_bytes));
        let rows: Vec<ContributorRow> = fileset
            .contributors
            .iter()
            .map(|c| ContributorRow {
                netid: if c.netid == UNKNOWN_NETID {
                    c.netid.red().to_string()
                } else {
                    c.netid.clone()
                },
                usage: c.cell.clone(),
            })
            .collect();
        print_table(&rows);
    }

    let unknown = report.unknown_count();
    if unknown > 0 {
        print_warning(&format!("{} contributor(s) could not be mapped to a netid", unknown));
    }
    let findings = diagnostics.len() + load_diagnostics.len();
    if findings > 0 {
        print_warning(&format!("{} data-quality finding(s), see the log", findings));
    }
    Ok(())
}
