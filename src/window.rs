/// Reporting window resolution.
///
/// Turns a period kind and a reference instant into an inclusive
/// `[from, to]` interval aligned to the calendar unit, plus the stable key
/// used to name the stored report records.
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StatsError};

/// Calendar unit a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodKind {
    #[serde(rename = "day")]
    Day,
    /// Monday through Sunday.
    #[serde(rename = "isoWeek")]
    IsoWeek,
    /// Sunday through Saturday.
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Day => "day",
            PeriodKind::IsoWeek => "isoWeek",
            PeriodKind::Week => "week",
            PeriodKind::Month => "month",
        }
    }

    /// Moves an instant back by exactly one unit of this period.
    ///
    /// Month steps clamp the day of month (March 31st becomes February 28th
    /// or 29th).
    fn step_back(self, instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            PeriodKind::Day => instant.checked_sub_days(Days::new(1)),
            PeriodKind::IsoWeek | PeriodKind::Week => instant.checked_sub_days(Days::new(7)),
            PeriodKind::Month => instant.checked_sub_months(Months::new(1)),
        }
    }

    fn first_day(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            PeriodKind::Day => Some(date),
            PeriodKind::IsoWeek => {
                date.checked_sub_days(Days::new(date.weekday().num_days_from_monday() as u64))
            }
            PeriodKind::Week => {
                date.checked_sub_days(Days::new(date.weekday().num_days_from_sunday() as u64))
            }
            PeriodKind::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
        }
    }

    fn last_day(self, first: NaiveDate) -> Option<NaiveDate> {
        match self {
            PeriodKind::Day => Some(first),
            PeriodKind::IsoWeek | PeriodKind::Week => first.checked_add_days(Days::new(6)),
            PeriodKind::Month => first
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt()),
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("day") {
            Ok(PeriodKind::Day)
        } else if s.eq_ignore_ascii_case("isoWeek")
            || s.eq_ignore_ascii_case("iso_week")
            || s.eq_ignore_ascii_case("iso-week")
        {
            Ok(PeriodKind::IsoWeek)
        } else if s.eq_ignore_ascii_case("week") {
            Ok(PeriodKind::Week)
        } else if s.eq_ignore_ascii_case("month") {
            Ok(PeriodKind::Month)
        } else {
            Err(StatsError::InvalidPeriod(s.to_string()))
        }
    }
}

/// Resolved reporting window with inclusive boundaries (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWindow {
    /// Start of the first day, 00:00:00.000
    pub from: DateTime<Utc>,
    /// End of the last day, 23:59:59.999
    pub to: DateTime<Utc>,
    pub period_kind: PeriodKind,
    /// Stable report identifier, e.g. `isoWeek_2025_3_17-23`
    pub key: String,
}

impl ReportWindow {
    /// Validates the period text, then resolves the window.
    pub fn resolve(
        period: &str,
        reference: DateTime<Utc>,
        finished_period_offset: bool,
    ) -> Result<Self> {
        let kind = period.parse::<PeriodKind>()?;
        resolve_window(kind, reference, finished_period_offset)
    }

    /// Inclusive on both ends.
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        self.from <= *instant && *instant <= self.to
    }

    /// Key of the structured JSON record.
    pub fn data_key(&self) -> String {
        format!("{}_data", self.key)
    }

    /// Key of a rendered page with the given file extension.
    pub fn page_key(&self, extension: &str) -> String {
        format!("{}.{}", self.key, extension)
    }
}

/// Computes the window covering `reference` (or the period before it when
/// `finished_period_offset` is set).
pub fn resolve_window(
    kind: PeriodKind,
    reference: DateTime<Utc>,
    finished_period_offset: bool,
) -> Result<ReportWindow> {
    let reference = if finished_period_offset {
        kind.step_back(reference)
            .ok_or_else(|| StatsError::InvalidDate(reference.to_rfc3339()))?
    } else {
        reference
    };

    let date = reference.date_naive();
    let out_of_range = || StatsError::InvalidDate(date.to_string());

    let first = kind.first_day(date).ok_or_else(out_of_range)?;
    let last = kind.last_day(first).ok_or_else(out_of_range)?;

    let from = first.and_time(NaiveTime::MIN).and_utc();
    let to = last
        .and_hms_milli_opt(23, 59, 59, 999)
        .ok_or_else(out_of_range)?
        .and_utc();

    Ok(ReportWindow {
        from,
        to,
        period_kind: kind,
        key: window_key(kind, first, last),
    })
}

fn window_key(kind: PeriodKind, first: NaiveDate, last: NaiveDate) -> String {
    match kind {
        PeriodKind::Day => format!(
            "day_{}_{}_{}",
            first.year(),
            first.month(),
            first.day()
        ),
        PeriodKind::IsoWeek | PeriodKind::Week => format!(
            "{}_{}_{}_{}-{}",
            kind.as_str(),
            first.year(),
            first.month(),
            first.day(),
            last.day()
        ),
        PeriodKind::Month => format!("month_{}_{}", first.year(), first.month()),
    }
}

/// Parses a reference instant given as RFC 3339 or as a plain `YYYY-MM-DD`
/// date (midnight UTC).
pub fn parse_reference(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| StatsError::InvalidDate(text.to_string()))
}
