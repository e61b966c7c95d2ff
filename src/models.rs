use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Story arc covering a contiguous run of episodes
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoryArc {
    pub id: i64,
    pub name: String,
    pub start_episode: i64,
    pub end_episode: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Episode as stored
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Episode {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub airdate: Option<NaiveDate>,
    #[serde(default)]
    pub arc_id: Option<i64>,
}

/// Episode joined with its arc name
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct EpisodeWithArc {
    pub id: i64,
    pub title: String,
    pub airdate: Option<NaiveDate>,
    pub arc_id: Option<i64>,
    pub arc_name: Option<String>,
}

/// Logged viewing of one episode
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct WatchEntry {
    pub id: i64,
    pub episode_id: i64,
    pub watched_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub episode: Option<EpisodeWithArc>,
}

/// Raw (date, arc) pair feeding the analytics chart
#[derive(Debug, Clone, PartialEq)]
pub struct WatchRecord {
    pub watched_date: NaiveDate,
    pub arc_name: Option<String>,
}

/// Catalog file loaded at startup
#[derive(Debug, Deserialize, Default)]
pub struct SeedData {
    #[serde(default)]
    pub arcs: Vec<StoryArc>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// Body of POST /watch-history.
/// Fields stay optional so missing values surface as 400 rather than 422.
#[derive(Debug, Deserialize)]
pub struct WatchEntryInput {
    pub episode_id: Option<i64>,
    pub watched_date: Option<String>,
}

/// Body of PUT /watch-history/:id
#[derive(Debug, Deserialize)]
pub struct WatchDateInput {
    pub watched_date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct EpisodeQuery {
    pub limit: Option<usize>,
    pub search: Option<String>,
    pub episode_id: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AnalyticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Simple status message
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
}
