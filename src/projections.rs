use chrono::{NaiveDate, Weekday};
use serde::Serialize;
use thiserror::Error;

use crate::aggregator::{aggregate, count_in_week, inclusive_day_count, DayBucket, WatchEvent};
use crate::models::WatchRecord;
use crate::store::{Store, StoreError, WatchRecordSource};


#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("date range spans {days} days, at most {max} allowed")]
    SpanTooLarge { days: i64, max: i64 },
}

impl From<WatchRecord> for WatchEvent {
    fn from(record: WatchRecord) -> Self {
        WatchEvent::new(record.watched_date, record.arc_name)
    }
}

/// Chart data plus headline counts for the analytics view
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub chart_data: Vec<DayBucket>,
    pub total_episodes: usize,
    pub episodes_this_week: usize,
}

/// Projects analytics from watch records.
/// Headline counts cover every fetched record; the chart covers the resolved range.
/// `max_days` limits explicit ranges only.
pub struct AnalyticsProjector<'a, S> {
    source: &'a S,
    week_start: Weekday,
    max_days: i64,
}

impl<'a, S: WatchRecordSource> AnalyticsProjector<'a, S> {
    pub fn new(source: &'a S, week_start: Weekday, max_days: i64) -> Self {
        Self {
            source,
            week_start,
            max_days,
        }
    }

    pub fn analyze(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<AnalyticsReport, ProjectionError> {
        // inferred spans are never capped
        if let (Some(first), Some(last)) = (start, end) {
            let days = inclusive_day_count(first, last);
            if days > self.max_days {
                return Err(ProjectionError::SpanTooLarge {
                    days,
                    max: self.max_days,
                });
            }
        }

        let events: Vec<WatchEvent> = self
            .source
            .watch_records(start, end)?
            .into_iter()
            .map(WatchEvent::from)
            .collect();

        let episodes_this_week = count_in_week(events.iter().map(|e| e.date), today, self.week_start);

        Ok(AnalyticsReport {
            chart_data: aggregate(&events, start, end),
            total_episodes: events.len(),
            episodes_this_week,
        })
    }
}

/// Viewing progress against the latest released episode
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub latest_available: i64,
    pub highest_watched: i64,
    pub progress_percentage: i64,
    pub total_watched: i64,
    pub is_caught_up: bool,
}

impl ProgressReport {
    pub fn compute(latest: Option<i64>, highest: Option<i64>, total_watched: i64) -> Self {
        let latest_available = latest.unwrap_or(0);
        let highest_watched = highest.unwrap_or(0);
        let progress_percentage = if latest_available > 0 {
            (highest_watched as f64 / latest_available as f64 * 100.0).round() as i64
        } else {
            0
        };

        Self {
            latest_available,
            highest_watched,
            progress_percentage,
            total_watched,
            is_caught_up: highest_watched >= latest_available,
        }
    }

    pub fn project(store: &Store, today: NaiveDate) -> Result<Self, StoreError> {
        Ok(Self::compute(
            store.latest_released_episode(today)?,
            store.highest_watched_episode()?,
            store.count_watched()?,
        ))
    }
}
