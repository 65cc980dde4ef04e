//! Parser for the JSON import files.
//!
//! - `catalog.json`: array of [`Song`] objects
//! - `history.json`: array of listening records, see [`HistoryRecord`]

use crate::error::{LibraryError, Result};
use crate::types::*;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// One row of `history.json` as exported by the player.
///
/// `completion_rate` wins when present; otherwise it is derived from
/// `total_duration_ms`, falling back to the catalog duration of the song.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    pub song_id: SongId,
    pub timestamp: Timestamp,
    pub listen_duration_ms: u64,
    #[serde(default)]
    pub total_duration_ms: Option<u64>,
    #[serde(default)]
    pub completion_rate: Option<f64>,
    #[serde(default)]
    pub skipped: bool,
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(LibraryError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(std::fs::read_to_string(path)?)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Parse and validate a catalog file.
pub fn parse_catalog(path: &Path) -> Result<Vec<Song>> {
    let content = read_file(path)?;
    parse_catalog_str(&content, &file_name(path))
}

pub fn parse_catalog_str(content: &str, file: &str) -> Result<Vec<Song>> {
    let songs: Vec<Song> = serde_json::from_str(content).map_err(|source| LibraryError::Decode {
        file: file.to_string(),
        source,
    })?;

    let mut seen = HashSet::new();
    for song in &songs {
        if song.id.trim().is_empty() {
            return Err(LibraryError::InvalidValue {
                field: "id".to_string(),
                value: format!("empty id for '{}'", song.title),
            });
        }
        if !seen.insert(song.id.as_str()) {
            return Err(LibraryError::InvalidValue {
                field: "id".to_string(),
                value: format!("duplicate id {}", song.id),
            });
        }
    }
    Ok(songs)
}

/// Parse a history file, resolving durations against `catalog`.
pub fn parse_history(path: &Path, catalog: &[Song]) -> Result<Vec<ListeningEvent>> {
    let content = read_file(path)?;
    parse_history_str(&content, &file_name(path), catalog)
}

pub fn parse_history_str(content: &str, file: &str, catalog: &[Song]) -> Result<Vec<ListeningEvent>> {
    let records: Vec<HistoryRecord> =
        serde_json::from_str(content).map_err(|source| LibraryError::Decode {
            file: file.to_string(),
            source,
        })?;

    let durations: HashMap<&str, u64> = catalog
        .iter()
        .map(|song| (song.id.as_str(), song.duration_ms))
        .collect();

    records
        .into_iter()
        .map(|record| {
            let Some(&catalog_duration) = durations.get(record.song_id.as_str()) else {
                return Err(LibraryError::UnknownSong(record.song_id));
            };
            to_event(record, catalog_duration)
        })
        .collect()
}

fn to_event(record: HistoryRecord, catalog_duration: u64) -> Result<ListeningEvent> {
    if record.timestamp < 0 {
        return Err(LibraryError::InvalidValue {
            field: "timestamp".to_string(),
            value: record.timestamp.to_string(),
        });
    }
    let total = record.total_duration_ms.unwrap_or(catalog_duration);
    let mut event = ListeningEvent::new(
        record.song_id,
        record.timestamp,
        record.listen_duration_ms,
        total,
        record.skipped,
    );
    if let Some(rate) = record.completion_rate {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(LibraryError::InvalidValue {
                field: "completion_rate".to_string(),
                value: rate.to_string(),
            });
        }
        event.completion_rate = rate;
    }
    Ok(event)
}
