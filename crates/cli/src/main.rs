//! Sponsor usage CLI
//!
//! Runs the usage engine over snapshot inputs named in the configuration
//! and prints sponsor summaries, storage shares and reporting periods.

mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::{period, run, storage};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use usage_lib::ReportKind;

/// Sponsor usage reports
#[derive(Parser)]
#[command(name = "sponsor-usage")]
#[command(author, version, about = "Cluster sponsor usage reports", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/sponsor-usage/config.toml)
    #[arg(long, short, env = "SPONSOR_USAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full report and write the archive
    Run {
        /// Months covered, used to label the run
        #[arg(long)]
        months: Option<u32>,

        /// Report kind (sponsors, users)
        #[arg(long, default_value = "sponsors")]
        kind: ReportKind,

        /// Date the run is for (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Skip writing the archive
        #[arg(long)]
        no_archive: bool,

        /// Also print the per-pool usage table
        #[arg(long)]
        usage: bool,
    },

    /// Show storage usage under a sponsor's filesets
    Storage {
        /// Sponsor netid
        #[arg(long, short)]
        sponsor: String,
    },

    /// Show the reporting period for a report
    Period {
        /// Number of months
        #[arg(long, default_value_t = 1)]
        months: u32,

        /// Report kind (sponsors, users)
        #[arg(long, default_value = "sponsors")]
        kind: ReportKind,

        /// Date to compute from (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

fn init_tracing(json: bool, verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.verbose);

    match cli.command {
        Commands::Run {
            months,
            kind,
            today,
            no_archive,
            usage,
        } => {
            let config = config::ReportConfig::load(cli.config.as_deref())?;
            let period = months
                .map(|m| period::resolve_period(m, kind, today))
                .transpose()?;
            run::run_report(
                &config,
                run::RunOptions {
                    period,
                    write_archive: !no_archive,
                    show_usage: usage,
                },
                cli.format,
            )?;
        }
        Commands::Storage { sponsor } => {
            let config = config::ReportConfig::load(cli.config.as_deref())?;
            storage::show_storage(&config, &sponsor, cli.format)?;
        }
        Commands::Period {
            months,
            kind,
            today,
        } => {
            period::show_period(months, kind, today, cli.format)?;
        }
    }

    Ok(())
}
