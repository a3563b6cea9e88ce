//! Full report run

use anyhow::{Context, Result};
use colored::Colorize;
use tabled::Tabled;
use usage_lib::accounting::SacctExportFile;
use usage_lib::pipeline::write_archive_file;
use usage_lib::storage::{MetricsSource, PromSnapshotDir};
use usage_lib::{
    Diagnostics, Pipeline, ReportMetrics, ReportingPeriod, RunInputs, RunOutput, SponsorRollup,
    StructuredLogger,
};

use super::{load_departed_users, load_directory, load_uids};
use crate::config::{required, ReportConfig};
use crate::output::{
    color_efficiency, format_count, print_info, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for the sponsor summary table
#[derive(Tabled)]
struct SponsorRow {
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Sponsor")]
    sponsor: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Users")]
    users: usize,
    #[tabled(rename = "CPU-hours")]
    cpu_hours: String,
    #[tabled(rename = "GPU-hours")]
    gpu_hours: String,
    #[tabled(rename = "Jobs")]
    jobs: String,
}

impl From<&SponsorRollup> for SponsorRow {
    fn from(rollup: &SponsorRollup) -> Self {
        Self {
            cluster: rollup.cluster.clone(),
            sponsor: rollup.sponsor.clone(),
            name: rollup.sponsor_name.clone().unwrap_or_default(),
            users: rollup.members.len(),
            cpu_hours: format_count(rollup.cpu_hours),
            gpu_hours: format_count(rollup.gpu_hours),
            jobs: format_count(rollup.jobs),
        }
    }
}

/// Row for the per-pool usage table
#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Pool")]
    pool: String,
    #[tabled(rename = "NetID")]
    netid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "CPU-hours")]
    cpu_hours: String,
    #[tabled(rename = "CPU-eff")]
    cpu_eff: String,
    #[tabled(rename = "CPU-rank")]
    cpu_rank: String,
    #[tabled(rename = "GPU-hours")]
    gpu_hours: String,
    #[tabled(rename = "GPU-eff")]
    gpu_eff: String,
    #[tabled(rename = "GPU-rank")]
    gpu_rank: String,
}

/// Options for a run beyond the configuration file
pub struct RunOptions {
    pub period: Option<ReportingPeriod>,
    pub write_archive: bool,
    pub show_usage: bool,
}

pub fn run_report(config: &ReportConfig, options: RunOptions, format: OutputFormat) -> Result<()> {
    let label = options
        .period
        .map(|p| p.to_string())
        .unwrap_or_else(|| "unlabelled".to_string());
    let logger = StructuredLogger::new(label.as_str());

    // findings from loading the snapshot inputs, reported alongside the run's own
    let mut load_diagnostics = Diagnostics::new();
    let export_path = required(&config.accounting_export, "accounting_export")?;
    let accounting = SacctExportFile::new(export_path);
    let directory = load_directory(config, &mut load_diagnostics)?;
    let departed_users = load_departed_users(config, &mut load_diagnostics)?;
    let uids = load_uids(config, &mut load_diagnostics)?;
    let metrics_source = config.metrics_dir.as_ref().map(PromSnapshotDir::new);

    let pipeline = Pipeline::new(config.engine.clone(), logger.clone());
    let output = pipeline.run(RunInputs {
        accounting: &accounting,
        directory: &directory,
        departed_users,
        uids,
        metrics: metrics_source.as_ref().map(|m| m as &dyn MetricsSource),
    })?;

    if options.write_archive {
        if let Some(path) = &config.archive_path {
            write_archive_file(&output.archive, path)
                .with_context(|| format!("Failed to write archive {}", path.display()))?;
            logger.log_archive_written(path, output.archive.len());
        }
    }

    let metrics = ReportMetrics::new();
    metrics.record_run(&output.stats);
    if let Some(path) = &config.metrics_textfile {
        metrics
            .write_textfile(path)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Table => {
            print_summary(&output, &label, &load_diagnostics, options.show_usage)
        }
    }
    Ok(())
}

fn print_summary(
    output: &RunOutput,
    label: &str,
    load_diagnostics: &Diagnostics,
    show_usage: bool,
) {
    println!("{} {}", "Sponsor Usage".bold(), label.cyan());
    println!("{}", "=".repeat(60));

    let rows: Vec<SponsorRow> = output.sponsors.iter().map(SponsorRow::from).collect();
    print_table(&rows);

    if show_usage {
        println!();
        let rows: Vec<UsageRow> = output
            .usage
            .iter()
            .map(|row| {
                let ranked = &row.ranked;
                UsageRow {
                    pool: ranked.usage.pool.as_key(),
                    netid: ranked.usage.netid.clone(),
                    name: row.name.clone().unwrap_or_default(),
                    cpu_hours: format_count(ranked.usage.cpu_hours),
                    cpu_eff: color_efficiency(ranked.efficiency.cpu_eff),
                    cpu_rank: ranked.cpu_rank.to_string(),
                    gpu_hours: format_count(ranked.usage.gpu_hours),
                    gpu_eff: color_efficiency(ranked.efficiency.gpu_eff),
                    gpu_rank: ranked.gpu_rank.to_string(),
                }
            })
            .collect();
        print_table(&rows);
    }

    println!();
    let stats = &output.stats;
    print_success(&format!(
        "Processed {} jobs into {} rows ({} rejected)",
        format_count(stats.jobs_ingested as u64),
        format_count(stats.aggregate_rows as u64),
        stats.jobs_rejected
    ));
    for report in &output.storage {
        print_info(&format!(
            "Storage for {}: {} fileset(s)",
            report.sponsor,
            report.filesets.len()
        ));
    }
    if stats.unresolved_identities > 0 {
        print_warning(&format!(
            "{} identities have no sponsor",
            stats.unresolved_identities
        ));
    }
    for (kind, count) in &stats.diagnostics {
        print_warning(&format!("{}: {}", kind, count));
    }
    if !load_diagnostics.is_empty() {
        print_warning(&format!(
            "{} finding(s) while loading inputs",
            load_diagnostics.len()
        ));
    }
}
