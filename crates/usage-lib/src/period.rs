//! Reporting periods

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which report a period is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Whole calendar months ending with the previous month
    Sponsors,
    /// A rolling window ending yesterday
    Users,
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sponsors" => Ok(ReportKind::Sponsors),
            "users" => Ok(ReportKind::Users),
            other => Err(format!("unknown report kind {:?} (expected sponsors or users)", other)),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Sponsors => f.write_str("sponsors"),
            ReportKind::Users => f.write_str("users"),
        }
    }
}

/// Inclusive date range covered by a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportingPeriod {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// Period ending just before `today`
///
/// Returns `None` when `months` is zero or the dates leave chrono's range.
pub fn reporting_period(
    today: NaiveDate,
    months: u32,
    kind: ReportKind,
) -> Option<ReportingPeriod> {
    if months == 0 {
        return None;
    }
    match kind {
        ReportKind::Sponsors => {
            let first_of_month = today.with_day(1)?;
            let start = first_of_month.checked_sub_months(Months::new(months))?;
            let end = first_of_month - Duration::days(1);
            Some(ReportingPeriod { start, end })
        }
        ReportKind::Users => {
            let start = today.checked_sub_months(Months::new(months))?;
            let end = today - Duration::days(1);
            Some(ReportingPeriod { start, end })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn period(today: NaiveDate, months: u32, kind: ReportKind) -> (NaiveDate, NaiveDate) {
        let p = reporting_period(today, months, kind).unwrap();
        (p.start, p.end)
    }

    #[test]
    fn test_sponsor_periods() {
        use ReportKind::Sponsors;
        assert_eq!(period(d(2022, 5, 1), 1, Sponsors), (d(2022, 4, 1), d(2022, 4, 30)));
        assert_eq!(period(d(2022, 5, 1), 3, Sponsors), (d(2022, 2, 1), d(2022, 4, 30)));
        assert_eq!(period(d(2022, 5, 1), 7, Sponsors), (d(2021, 10, 1), d(2022, 4, 30)));
        assert_eq!(period(d(2022, 1, 1), 3, Sponsors), (d(2021, 10, 1), d(2021, 12, 31)));
        assert_eq!(period(d(2022, 1, 1), 1, Sponsors), (d(2021, 12, 1), d(2021, 12, 31)));
        assert_eq!(period(d(2022, 11, 1), 5, Sponsors), (d(2022, 6, 1), d(2022, 10, 31)));
        assert_eq!(period(d(2024, 3, 1), 5, Sponsors), (d(2023, 10, 1), d(2024, 2, 29)));
    }

    #[test]
    fn test_user_periods() {
        use ReportKind::Users;
        assert_eq!(period(d(2022, 5, 15), 1, Users), (d(2022, 4, 15), d(2022, 5, 14)));
        assert_eq!(period(d(2022, 1, 15), 1, Users), (d(2021, 12, 15), d(2022, 1, 14)));
        assert_eq!(period(d(2022, 12, 15), 1, Users), (d(2022, 11, 15), d(2022, 12, 14)));
    }

    #[test]
    fn test_zero_months_and_display() {
        assert_eq!(reporting_period(d(2022, 5, 1), 0, ReportKind::Users), None);
        let p = reporting_period(d(2022, 5, 1), 1, ReportKind::Sponsors).unwrap();
        assert_eq!(p.to_string(), "2022-04-01 to 2022-04-30");
        assert_eq!(p.days(), 30);
        assert_eq!("Users".parse::<ReportKind>(), Ok(ReportKind::Users));
        assert!("weekly".parse::<ReportKind>().is_err());
    }
}
