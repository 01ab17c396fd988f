use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use super::log_record::LogRecord;
use super::severity::{Color, Severity};
use crate::error::ScribeError;

/// Optional, conjunctive criteria for a log scan.
///
/// Severity and source match the effective value of a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub search: Option<String>,
    pub severity: Option<Severity>,
    pub source: Option<String>,
    pub color: Option<Color>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Which end of a date range a bare `YYYY-MM-DD` value should snap to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Start,
    End,
}

impl LogFilter {
    /// Builds a filter from raw query-string values. Blank values are ignored.
    pub fn from_raw(
        search: Option<&str>,
        severity: Option<&str>,
        source: Option<&str>,
        color: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, ScribeError> {
        let color = match present(color) {
            Some(raw) => Some(
                Color::parse(raw)
                    .ok_or_else(|| ScribeError::validation(format!("invalid color: {raw}")))?,
            ),
            None => None,
        };
        let from = present(from)
            .map(|raw| parse_date_bound(raw, DateBound::Start))
            .transpose()?;
        let to = present(to)
            .map(|raw| parse_date_bound(raw, DateBound::End))
            .transpose()?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ScribeError::validation("`from` must not be after `to`"));
            }
        }

        Ok(Self {
            search: present(search).map(str::to_owned),
            severity: present(severity).map(Severity::parse),
            source: present(source).map(str::to_owned),
            color,
            from,
            to,
            limit: None,
            offset: 0,
        })
    }

    #[must_use]
    pub fn with_page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// True when no criteria are set (pagination aside).
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.search.is_none()
            && self.severity.is_none()
            && self.source.is_none()
            && self.color.is_none()
            && self.from.is_none()
            && self.to.is_none()
    }
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 timestamps or plain dates. A plain date covers the whole
/// day: start of day for `from`, last microsecond of the day for `to`.
pub fn parse_date_bound(raw: &str, bound: DateBound) -> Result<DateTime<Utc>, ScribeError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ScribeError::validation(format!("invalid date: {raw}")))?;
    let time = match bound {
        DateBound::Start => NaiveTime::MIN,
        DateBound::End => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
            .ok_or_else(|| ScribeError::Internal("end-of-day time out of range".into()))?,
    };
    Ok(date.and_time(time).and_utc())
}

/// One page of a filtered scan plus the total matching the same criteria.
#[derive(Debug, Clone, Default)]
pub struct LogPage {
    pub records: Vec<LogRecord>,
    pub total: u64,
}
