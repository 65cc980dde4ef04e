//! SQLite-backed [`LibraryStore`].
//!
//! One connection guarded by a mutex. Every statement is short, so holding the
//! lock across a call never blocks for long.

use crate::error::{LibraryError, Result};
use crate::store::LibraryStore;
use crate::types::*;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS songs (
        seq          INTEGER PRIMARY KEY AUTOINCREMENT,
        id           TEXT    NOT NULL UNIQUE,
        title        TEXT    NOT NULL,
        artist       TEXT    NOT NULL,
        album        TEXT,
        genre        TEXT,
        duration_ms  INTEGER NOT NULL,
        release_year INTEGER,
        path         TEXT
    );
    CREATE TABLE IF NOT EXISTS listening_events (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        song_id            TEXT    NOT NULL,
        timestamp          INTEGER NOT NULL,
        listen_duration_ms INTEGER NOT NULL,
        completion_rate    REAL    NOT NULL,
        skipped            INTEGER NOT NULL,
        hour_of_day        INTEGER NOT NULL,
        day_of_week        INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_song ON listening_events(song_id);
    CREATE TABLE IF NOT EXISTS preferences (
        song_id             TEXT PRIMARY KEY,
        play_count          INTEGER NOT NULL,
        skip_count          INTEGER NOT NULL,
        avg_completion_rate REAL    NOT NULL,
        last_played         INTEGER
    );
    CREATE TABLE IF NOT EXISTS transitions (
        from_song           TEXT    NOT NULL,
        to_song             TEXT    NOT NULL,
        weight              REAL    NOT NULL,
        play_count          INTEGER NOT NULL,
        skip_count          INTEGER NOT NULL,
        avg_completion_rate REAL    NOT NULL,
        last_occurred       INTEGER NOT NULL,
        decayed_through     INTEGER NOT NULL,
        PRIMARY KEY (from_song, to_song)
    );
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened library database at {:?}", path);
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut conn).map_err(LibraryError::from)
    }
}

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    let path: Option<String> = row.get(7)?;
    Ok(Song {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        genre: row.get(4)?,
        duration_ms: row.get::<_, i64>(5)?.max(0) as u64,
        release_year: row.get(6)?,
        path: path.map(PathBuf::from),
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ListeningEvent> {
    Ok(ListeningEvent {
        song_id: row.get(0)?,
        timestamp: row.get(1)?,
        listen_duration_ms: row.get::<_, i64>(2)?.max(0) as u64,
        completion_rate: row.get(3)?,
        skipped: row.get(4)?,
        hour_of_day: row.get(5)?,
        day_of_week: row.get(6)?,
    })
}

fn preference_from_row(row: &Row<'_>) -> rusqlite::Result<PreferenceRecord> {
    Ok(PreferenceRecord {
        song_id: row.get(0)?,
        play_count: row.get(1)?,
        skip_count: row.get(2)?,
        avg_completion_rate: row.get(3)?,
        last_played: row.get(4)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<TransitionEdge> {
    Ok(TransitionEdge {
        from: row.get(0)?,
        to: row.get(1)?,
        weight: row.get(2)?,
        play_count: row.get(3)?,
        skip_count: row.get(4)?,
        avg_completion_rate: row.get(5)?,
        last_occurred: row.get(6)?,
        decayed_through: row.get(7)?,
    })
}

const SONG_COLUMNS: &str = "id, title, artist, album, genre, duration_ms, release_year, path";
const EDGE_COLUMNS: &str =
    "from_song, to_song, weight, play_count, skip_count, avg_completion_rate, last_occurred, decayed_through";

fn insert_edge(conn: &Connection, edge: &TransitionEdge) -> rusqlite::Result<usize> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO transitions ({EDGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            edge.from,
            edge.to,
            edge.weight,
            edge.play_count,
            edge.skip_count,
            edge.avg_completion_rate,
            edge.last_occurred,
            edge.decayed_through,
        ],
    )
}

fn insert_event(conn: &Connection, event: &ListeningEvent) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO listening_events
            (song_id, timestamp, listen_duration_ms, completion_rate, skipped, hour_of_day, day_of_week)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.song_id,
            event.timestamp,
            event.listen_duration_ms as i64,
            event.completion_rate,
            event.skipped,
            event.hour_of_day,
            event.day_of_week,
        ],
    )
}

fn insert_preference(conn: &Connection, record: &PreferenceRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO preferences
            (song_id, play_count, skip_count, avg_completion_rate, last_played)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.song_id,
            record.play_count,
            record.skip_count,
            record.avg_completion_rate,
            record.last_played,
        ],
    )
}

#[async_trait]
impl LibraryStore for SqliteStore {
    async fn catalog(&self) -> Result<Vec<Song>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {SONG_COLUMNS} FROM songs ORDER BY seq"))?;
            let songs = stmt.query_map([], song_from_row)?;
            songs.collect()
        })
    }

    async fn song(&self, song_id: &str) -> Result<Option<Song>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?1"),
                [song_id],
                song_from_row,
            )
            .optional()
        })
    }

    async fn upsert_song(&self, song: Song) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO songs (id, title, artist, album, genre, duration_ms, release_year, path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    artist = excluded.artist,
                    album = excluded.album,
                    genre = excluded.genre,
                    duration_ms = excluded.duration_ms,
                    release_year = excluded.release_year,
                    path = excluded.path",
                params![
                    song.id,
                    song.title,
                    song.artist,
                    song.album,
                    song.genre,
                    song.duration_ms as i64,
                    song.release_year,
                    song.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                ],
            )
        })?;
        Ok(())
    }

    async fn remove_song(&self, song_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM songs WHERE id = ?1", [song_id])?;
            tx.execute("DELETE FROM listening_events WHERE song_id = ?1", [song_id])?;
            tx.execute("DELETE FROM preferences WHERE song_id = ?1", [song_id])?;
            tx.execute(
                "DELETE FROM transitions WHERE from_song = ?1 OR to_song = ?1",
                [song_id],
            )?;
            tx.commit()
        })?;
        debug!(song_id, "Removed song and its learned state");
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ListeningEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT song_id, timestamp, listen_duration_ms, completion_rate, skipped, hour_of_day, day_of_week
                 FROM listening_events ORDER BY timestamp, id",
            )?;
            let events = stmt.query_map([], event_from_row)?;
            events.collect()
        })
    }

    async fn append_event(&self, event: ListeningEvent) -> Result<()> {
        self.with_conn(|conn| insert_event(conn, &event))?;
        Ok(())
    }

    async fn preferences(&self) -> Result<Vec<PreferenceRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT song_id, play_count, skip_count, avg_completion_rate, last_played FROM preferences",
            )?;
            let records = stmt.query_map([], preference_from_row)?;
            records.collect()
        })
    }

    async fn preference(&self, song_id: &str) -> Result<Option<PreferenceRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT song_id, play_count, skip_count, avg_completion_rate, last_played
                 FROM preferences WHERE song_id = ?1",
                [song_id],
                preference_from_row,
            )
            .optional()
        })
    }

    async fn save_preference(&self, record: PreferenceRecord) -> Result<()> {
        self.with_conn(|conn| insert_preference(conn, &record))?;
        Ok(())
    }

    async fn transitions(&self) -> Result<Vec<TransitionEdge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {EDGE_COLUMNS} FROM transitions"))?;
            let edges = stmt.query_map([], edge_from_row)?;
            edges.collect()
        })
    }

    async fn save_transition(&self, edge: TransitionEdge) -> Result<()> {
        self.with_conn(|conn| insert_edge(conn, &edge))?;
        Ok(())
    }

    async fn record_interaction(
        &self,
        event: ListeningEvent,
        preference: PreferenceRecord,
        edge: Option<TransitionEdge>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            insert_event(&tx, &event)?;
            insert_preference(&tx, &preference)?;
            if let Some(edge) = &edge {
                insert_edge(&tx, edge)?;
            }
            tx.commit()
        })?;
        Ok(())
    }

    async fn replace_transitions(&self, edges: Vec<TransitionEdge>) -> Result<()> {
        let count = edges.len();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM transitions", [])?;
            for edge in &edges {
                insert_edge(&tx, edge)?;
            }
            tx.commit()
        })?;
        debug!(count, "Rewrote transition table");
        Ok(())
    }

    async fn clear_learned_state(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "BEGIN;
                 DELETE FROM listening_events;
                 DELETE FROM preferences;
                 DELETE FROM transitions;
                 COMMIT;",
            )
        })?;
        info!("Cleared learned state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("library.db3");

        {
            let store = SqliteStore::open(&db).unwrap();
            store
                .upsert_song(
                    Song::new("a", "Alpha", "X")
                        .with_genre("Rock")
                        .with_duration_ms(180_000)
                        .with_path("/music/alpha.flac"),
                )
                .await
                .unwrap();
            store
                .append_event(ListeningEvent::new("a", 42, 90_000, 180_000, true))
                .await
                .unwrap();
            let mut edge = TransitionEdge::new("a", "b", 1.3, 42);
            edge.play_count = 3;
            store.save_transition(edge).await.unwrap();
        }

        let store = SqliteStore::open(&db).unwrap();
        let song = store.song("a").await.unwrap().unwrap();
        assert_eq!(song.genre.as_deref(), Some("Rock"));
        assert_eq!(song.path, Some(PathBuf::from("/music/alpha.flac")));

        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].skipped);
        assert!((history[0].completion_rate - 0.5).abs() < 1e-12);

        let edges = store.transitions().await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].play_count, 3);
        assert_eq!(edges[0].decayed_through, 42);
    }

    #[tokio::test]
    async fn test_record_interaction_in_one_transaction() {
        let store = SqliteStore::in_memory().unwrap();
        let mut record = PreferenceRecord::new("b");
        record.record_skip(0.05, 9);
        let mut edge = TransitionEdge::new("a", "b", 0.7, 9);
        edge.skip_count = 1;
        store
            .record_interaction(
                ListeningEvent::new("b", 9, 10_000, 200_000, true),
                record,
                Some(edge),
            )
            .await
            .unwrap();

        assert!(store.history().await.unwrap()[0].skipped);
        assert_eq!(store.preference("b").await.unwrap().unwrap().skip_count, 1);
        assert_eq!(store.transitions().await.unwrap()[0].skip_count, 1);

        // a failing statement rolls the whole unit back
        store
            .with_conn(|conn| conn.execute_batch("DROP TABLE transitions"))
            .unwrap();
        let result = store
            .record_interaction(
                ListeningEvent::new("b", 10, 10_000, 200_000, true),
                PreferenceRecord::new("c"),
                Some(TransitionEdge::new("a", "c", 0.7, 10)),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.history().await.unwrap().len(), 1);
        assert!(store.preference("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_transitions() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .save_transition(TransitionEdge::new("a", "b", 1.0, 0))
            .await
            .unwrap();
        store
            .replace_transitions(vec![TransitionEdge::new("c", "d", 0.5, 0)])
            .await
            .unwrap();
        let edges = store.transitions().await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, "c");
    }
}
