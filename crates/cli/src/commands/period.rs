//! Reporting period lookup

use anyhow::{Context, Result};
use chrono::NaiveDate;
use usage_lib::{reporting_period, ReportKind, ReportingPeriod};

use crate::output::{print_info, print_json, OutputFormat};

/// Period for `months` ending before `today` (the local date if not given)
pub fn resolve_period(
    months: u32,
    kind: ReportKind,
    today: Option<NaiveDate>,
) -> Result<ReportingPeriod> {
    let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
    reporting_period(today, months, kind)
        .with_context(|| format!("No {} period of {} month(s) before {}", kind, months, today))
}

pub fn show_period(
    months: u32,
    kind: ReportKind,
    today: Option<NaiveDate>,
    format: OutputFormat,
) -> Result<()> {
    let period = resolve_period(months, kind, today)?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "kind": kind,
            "start": period.start,
            "end": period.end,
            "days": period.days(),
        })),
        OutputFormat::Table => {
            print_info(&format!("{} report: {} ({} days)", kind, period, period.days()));
            Ok(())
        }
    }
}
