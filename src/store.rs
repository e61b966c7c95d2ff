use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Episode, EpisodeWithArc, SeedData, StoryArc, WatchEntry, WatchRecord};


const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS arcs (
        id            INTEGER PRIMARY KEY,
        name          TEXT NOT NULL,
        start_episode INTEGER NOT NULL,
        end_episode   INTEGER NOT NULL,
        description   TEXT
    );

    CREATE TABLE IF NOT EXISTS episodes (
        id      INTEGER PRIMARY KEY,
        title   TEXT NOT NULL,
        airdate TEXT,
        arc_id  INTEGER REFERENCES arcs(id)
    );

    CREATE TABLE IF NOT EXISTS watch_history (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        episode_id   INTEGER NOT NULL UNIQUE REFERENCES episodes(id),
        watched_date TEXT NOT NULL,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_watch_history_date ON watch_history(watched_date);
";

const ENTRY_SELECT: &str = "
    SELECT w.id, w.episode_id, w.watched_date, w.created_at, w.updated_at,
           e.id, e.title, e.airdate, e.arc_id, a.name
    FROM watch_history w
    LEFT JOIN episodes e ON e.id = w.episode_id
    LEFT JOIN arcs a ON a.id = e.arc_id
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("episode {0} does not exist")]
    UnknownEpisode(i64),

    #[error("episode {0} already watched")]
    AlreadyWatched(i64),

    #[error("watch entry {0} not found")]
    NotFound(i64),

    #[error("failed to read seed file: {0}")]
    SeedIo(#[from] std::io::Error),

    #[error("malformed seed file: {0}")]
    SeedFormat(#[from] serde_json::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

/// Supplies raw watch records for analytics.
/// Bounds are inclusive; a missing bound leaves that side open.
pub trait WatchRecordSource {
    fn watch_records(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<WatchRecord>, StoreError>;
}

/// Filter for the episode catalog
#[derive(Debug, Default, Clone)]
pub struct EpisodeFilter {
    pub episode_id: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

/// SQLite-backed catalog and watch history
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening database");
        Self::init(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    #[cfg(test)]
    pub fn upsert_arc(&self, arc: &StoryArc) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert_arc(&conn, arc)
    }

    #[cfg(test)]
    pub fn upsert_episode(&self, episode: &Episode) -> Result<(), StoreError> {
        let conn = self.lock()?;
        upsert_episode(&conn, episode)
    }

    /// Loads a JSON catalog of arcs and episodes in one transaction
    pub fn load_seed(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let seed: SeedData = serde_json::from_str(&raw)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for arc in &seed.arcs {
            upsert_arc(&tx, arc)?;
        }
        for episode in &seed.episodes {
            upsert_episode(&tx, episode)?;
        }
        tx.commit()?;

        info!(
            arcs = seed.arcs.len(),
            episodes = seed.episodes.len(),
            "Seed catalog loaded"
        );
        Ok(())
    }

    /// An id lookup ignores search and limit
    pub fn list_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<EpisodeWithArc>, StoreError> {
        let pattern = match (filter.episode_id, filter.search.as_deref().map(str::trim)) {
            (None, Some(term)) if !term.is_empty() => Some(like_pattern(term)),
            _ => None,
        };
        let limit = match filter.episode_id {
            Some(_) => -1,
            None => sql_limit(filter.limit),
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT e.id, e.title, e.airdate, e.arc_id, a.name
             FROM episodes e
             LEFT JOIN arcs a ON a.id = e.arc_id
             WHERE (?1 IS NULL OR e.id = ?1)
               AND (?2 IS NULL OR e.title LIKE ?2 ESCAPE '\\' OR a.name LIKE ?2 ESCAPE '\\')
             ORDER BY e.id ASC
             LIMIT ?3",
        )?;
        let episodes = stmt
            .query_map(params![filter.episode_id, pattern, limit], |row| {
                Ok(EpisodeWithArc {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    airdate: row.get(2)?,
                    arc_id: row.get(3)?,
                    arc_name: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(episodes)
    }

    /// Newest watched date first
    pub fn list_watch_history(&self, limit: Option<usize>) -> Result<Vec<WatchEntry>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("{ENTRY_SELECT} ORDER BY w.watched_date DESC, w.id DESC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![sql_limit(limit)], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn create_watch_entry(
        &self,
        episode_id: i64,
        watched_date: NaiveDate,
    ) -> Result<WatchEntry, StoreError> {
        let conn = self.lock()?;

        let exists = conn
            .query_row("SELECT 1 FROM episodes WHERE id = ?1", [episode_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::UnknownEpisode(episode_id));
        }

        let now = Utc::now();
        let inserted = conn.execute(
            "INSERT INTO watch_history (episode_id, watched_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![episode_id, watched_date, now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::AlreadyWatched(episode_id));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        debug!(id, episode_id, %watched_date, "Watch entry created");
        fetch_entry(&conn, id)
    }

    pub fn update_watch_date(&self, id: i64, watched_date: NaiveDate) -> Result<WatchEntry, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE watch_history SET watched_date = ?1, updated_at = ?2 WHERE id = ?3",
            params![watched_date, Utc::now(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        fetch_entry(&conn, id)
    }

    pub fn delete_watch_entry(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM watch_history WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Highest episode id that aired on or before `today`
    pub fn latest_released_episode(&self, today: NaiveDate) -> Result<Option<i64>, StoreError> {
        let conn = self.lock()?;
        let latest = conn.query_row(
            "SELECT MAX(id) FROM episodes WHERE airdate IS NOT NULL AND airdate <= ?1",
            [today],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    pub fn highest_watched_episode(&self) -> Result<Option<i64>, StoreError> {
        let conn = self.lock()?;
        let highest = conn.query_row("SELECT MAX(episode_id) FROM watch_history", [], |row| row.get(0))?;
        Ok(highest)
    }

    pub fn count_watched(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM watch_history", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl WatchRecordSource for Store {
    fn watch_records(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<WatchRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT w.watched_date, a.name
             FROM watch_history w
             LEFT JOIN episodes e ON e.id = w.episode_id
             LEFT JOIN arcs a ON a.id = e.arc_id
             WHERE (?1 IS NULL OR w.watched_date >= ?1)
               AND (?2 IS NULL OR w.watched_date <= ?2)
             ORDER BY w.watched_date ASC",
        )?;
        let records = stmt
            .query_map(params![start, end], |row| {
                Ok(WatchRecord {
                    watched_date: row.get(0)?,
                    arc_name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn upsert_arc(conn: &Connection, arc: &StoryArc) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO arcs (id, name, start_episode, end_episode, description)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             start_episode = excluded.start_episode,
             end_episode = excluded.end_episode,
             description = excluded.description",
        params![arc.id, arc.name, arc.start_episode, arc.end_episode, arc.description],
    )?;
    Ok(())
}

fn upsert_episode(conn: &Connection, episode: &Episode) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO episodes (id, title, airdate, arc_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             airdate = excluded.airdate,
             arc_id = excluded.arc_id",
        params![episode.id, episode.title, episode.airdate, episode.arc_id],
    )?;
    Ok(())
}

fn fetch_entry(conn: &Connection, id: i64) -> Result<WatchEntry, StoreError> {
    let sql = format!("{ENTRY_SELECT} WHERE w.id = ?1");
    conn.query_row(&sql, [id], entry_from_row)
        .optional()?
        .ok_or(StoreError::NotFound(id))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<WatchEntry> {
    let episode = match row.get::<_, Option<i64>>(5)? {
        Some(id) => Some(EpisodeWithArc {
            id,
            title: row.get(6)?,
            airdate: row.get(7)?,
            arc_id: row.get(8)?,
            arc_name: row.get(9)?,
        }),
        None => None,
    };

    Ok(WatchEntry {
        id: row.get(0)?,
        episode_id: row.get(1)?,
        watched_date: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        episode,
    })
}

/// SQLite treats a negative LIMIT as unbounded
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
