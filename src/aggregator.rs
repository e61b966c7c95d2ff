use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Serialize;
use thiserror::Error;


/// Label for watch events whose episode has no arc
pub const FALLBACK_CATEGORY: &str = "Unknown Arc";

const ISO_FORMAT: &str = "%Y-%m-%d";
const LABEL_FORMAT: &str = "%b %d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AggregateError> {
    NaiveDate::parse_from_str(raw.trim(), ISO_FORMAT)
        .map_err(|_| AggregateError::InvalidDate(raw.to_string()))
}

/// Blank query values count as absent
pub fn parse_optional_date(raw: Option<&str>) -> Result<Option<NaiveDate>, AggregateError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_date(value).map(Some),
    }
}

/// One episode logged as watched on a day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub date: NaiveDate,
    pub category: Option<String>,
}

impl WatchEvent {
    pub fn new(date: NaiveDate, category: Option<impl Into<String>>) -> Self {
        Self {
            date,
            category: category.map(Into::into),
        }
    }

    pub fn category_label(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => FALLBACK_CATEGORY,
        }
    }
}

/// One chart row: a day and its per-arc counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayBucket {
    #[serde(rename = "date")]
    pub display_label: String,
    #[serde(rename = "fullDate")]
    pub iso_date: String,
    #[serde(flatten)]
    pub counts: BTreeMap<String, u32>,
}

impl DayBucket {
    fn new(day: NaiveDate, counts: BTreeMap<String, u32>) -> Self {
        Self {
            display_label: day.format(LABEL_FORMAT).to_string(),
            iso_date: day.format(ISO_FORMAT).to_string(),
            counts,
        }
    }
}

/// Resolves the chart range.
///
/// Explicit bounds win. A missing start falls back to the earliest event,
/// a missing end to the latest. Returns None when a bound is missing and
/// there are no events to infer it from.
pub fn resolve_range(
    events: &[WatchEvent],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Option<(NaiveDate, NaiveDate)> {
    if let (Some(start), Some(end)) = (start, end) {
        return Some((start, end));
    }

    let earliest = events.iter().map(|e| e.date).min();
    let latest = events.iter().map(|e| e.date).max();

    Some((start.or(earliest)?, end.or(latest)?))
}

/// Builds one bucket per day of the resolved range, including empty days.
/// An inverted range yields no buckets.
pub fn aggregate(
    events: &[WatchEvent],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<DayBucket> {
    let Some((first, last)) = resolve_range(events, start, end) else {
        return Vec::new();
    };
    if first > last {
        return Vec::new();
    }

    let mut by_day: HashMap<NaiveDate, BTreeMap<String, u32>> = HashMap::new();
    for event in events.iter().filter(|e| e.date >= first && e.date <= last) {
        *by_day
            .entry(event.date)
            .or_default()
            .entry(event.category_label().to_string())
            .or_insert(0) += 1;
    }

    first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| DayBucket::new(day, by_day.remove(&day).unwrap_or_default()))
        .collect()
}

/// Number of days in `start..=end`, zero when inverted
pub fn inclusive_day_count(start: NaiveDate, end: NaiveDate) -> i64 {
    ((end - start).num_days() + 1).max(0)
}

/// First and last day of the week containing `today`
pub fn week_bounds(today: NaiveDate, week_start: Weekday) -> (NaiveDate, NaiveDate) {
    let offset = (7 + today.weekday().num_days_from_monday() - week_start.num_days_from_monday()) % 7;
    let start = today - Days::new(u64::from(offset));
    (start, start + Days::new(6))
}

pub fn count_in_week<I>(dates: I, today: NaiveDate, week_start: Weekday) -> usize
where
    I: IntoIterator<Item = NaiveDate>,
{
    let (start, end) = week_bounds(today, week_start);
    dates
        .into_iter()
        .filter(|date| *date >= start && *date <= end)
        .count()
}
