use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};
use now::DateTimeNow;

use crate::{daemon::storage::query::QueryRange, utils::time::next_day_start};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    pub start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    pub end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    pub date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to extract the whole day"
    )]
    pub treat_as_days: bool,
}

/// Without a start the range covers this many hours before the end.
const DEFAULT_SPAN_HOURS: i64 = 24;

fn parse_date(
    value: &str,
    now: DateTime<Local>,
    style: DateStyle,
    name: &str,
) -> Result<DateTime<Local>> {
    match parse_date_string(value, now, style.into()) {
        Ok(v) => Ok(v.with_timezone(&Local)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {name} date {e}"),
            )
            .into()),
    }
}

impl RangeArgs {
    /// Turns the arguments into a range relative to `now`, the last 24 hours by default.
    pub fn resolve(&self, now: DateTime<Local>) -> Result<QueryRange> {
        let mut end = match &self.end_date {
            Some(v) => parse_date(v, now, self.date_style, "end")?,
            None => now,
        };
        let mut start = match &self.start_date {
            Some(v) => parse_date(v, now, self.date_style, "start")?,
            None => end - Duration::hours(DEFAULT_SPAN_HOURS),
        };

        if self.treat_as_days {
            start = start.beginning_of_day();
            end = next_day_start(end).ok_or_else(|| {
                Args::command().error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("The day after {end} doesn't start at midnight"),
                )
            })?;
        }

        if start > end {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Start {start} is after end {end}"),
                )
                .into());
        }

        Ok(QueryRange {
            start: start.into(),
            end: end.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local, TimeZone};

    use super::{DateStyle, RangeArgs};

    fn args(start: Option<&str>, end: Option<&str>, treat_as_days: bool) -> RangeArgs {
        RangeArgs {
            start_date: start.map(Into::into),
            end_date: end.map(Into::into),
            date_style: DateStyle::Uk,
            treat_as_days,
        }
    }

    #[test]
    fn defaults_to_last_day() {
        let now = Local.with_ymd_and_hms(2025, 7, 16, 12, 0, 0).unwrap();
        let range = args(None, None, false).resolve(now).unwrap();
        assert_eq!(range.end, now);
        assert_eq!(range.end - range.start, Duration::hours(24));
    }

    #[test]
    fn whole_days_cover_midnight_to_midnight() {
        let now = Local.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap();
        let range = args(Some("15/07/2025"), Some("15/07/2025"), true)
            .resolve(now)
            .unwrap();
        assert_eq!(range.start, Local.with_ymd_and_hms(2025, 7, 15, 0, 0, 0).unwrap());
        assert_eq!(range.end, Local.with_ymd_and_hms(2025, 7, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_garbage_and_reversed_ranges() {
        let now = Local.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap();
        assert!(args(Some("whenever"), None, false).resolve(now).is_err());
        assert!(args(Some("16/07/2025"), Some("15/07/2025"), false)
            .resolve(now)
            .is_err());
    }
}
