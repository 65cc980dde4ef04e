//! Catalog and history import.
//!
//! Songs are upserted first. History is then replayed oldest first through
//! the same event paths live playback uses, so preference records, the
//! transition graph and skip bookkeeping come out exactly as if the events
//! had just happened. Replayed skips are history, not a live mood, so they
//! never reach skip-pattern detection. Import is additive: replaying a file
//! twice counts its plays twice.

use crate::error::Result;
use crate::manager::RecommendationManager;
use crate::types::{ImportReport, PlayEvent};
use music_library::parser::{parse_catalog, parse_history};
use music_library::{ListeningEvent, Song, SongId, Timestamp};
use sequence::SkipEvent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

impl RecommendationManager {
    #[instrument(skip(self))]
    pub async fn import_library(&self, catalog: &Path, history: Option<&Path>) -> Result<ImportReport> {
        let inner = self.inner().clone();
        let catalog_path = catalog.to_path_buf();
        let songs = tokio::task::spawn_blocking(move || parse_catalog(&catalog_path)).await??;

        let mut report = ImportReport {
            songs: songs.len(),
            ..ImportReport::default()
        };
        for song in songs {
            inner.store.upsert_song(song).await?;
        }
        info!("Imported {} songs", report.songs);

        if let Some(history) = history {
            let known = inner.store.catalog().await?;
            let history_path: PathBuf = history.to_path_buf();
            let catalog_snapshot = known.clone();
            let mut events =
                tokio::task::spawn_blocking(move || parse_history(&history_path, &catalog_snapshot)).await??;
            events.sort_by_key(|e| e.timestamp);

            let durations: HashMap<&str, u64> = known.iter().map(|s| (s.id.as_str(), s.duration_ms)).collect();
            let session_gap_ms = inner.config.features.session_gap_minutes * 60_000;
            let mut previous: Option<(SongId, Timestamp)> = None;

            for event in events {
                let before = previous
                    .as_ref()
                    .filter(|(id, at)| event.timestamp - at <= session_gap_ms && *id != event.song_id)
                    .map(|(id, _)| id.clone());
                let total = total_duration(&event, durations.get(event.song_id.as_str()).copied());
                previous = Some((event.song_id.clone(), event.timestamp));

                if event.skipped {
                    inner
                        .apply_skip(
                            SkipEvent {
                                song_id: event.song_id,
                                previous_song_id: before,
                                listen_duration_ms: event.listen_duration_ms,
                                total_duration_ms: total,
                                timestamp: event.timestamp,
                            },
                            false,
                        )
                        .await?;
                    report.skips += 1;
                } else {
                    let mut play = PlayEvent::new(event.song_id, event.listen_duration_ms, total, event.timestamp);
                    play.previous_song_id = before;
                    inner.apply_play(play).await?;
                    report.plays += 1;
                }
            }
            info!("Replayed {} plays and {} skips", report.plays, report.skips);
        }

        self.train_models().await?;
        Ok(report)
    }

    /// Add or replace a single catalog entry.
    pub async fn add_song(&self, song: Song) -> Result<()> {
        self.inner().store.upsert_song(song).await?;
        Ok(())
    }
}

/// Total length that reproduces the recorded completion rate.
fn total_duration(event: &ListeningEvent, catalog_ms: Option<u64>) -> u64 {
    if event.completion_rate > 0.0 {
        (event.listen_duration_ms as f64 / event.completion_rate).round() as u64
    } else {
        catalog_ms.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_duration_reproduces_completion() {
        let event = ListeningEvent::new("a", 0, 30_000, 120_000, true);
        assert_eq!(total_duration(&event, Some(999)), 120_000);

        let silent = ListeningEvent::new("a", 0, 0, 120_000, true);
        assert_eq!(total_duration(&silent, Some(120_000)), 120_000);
        assert_eq!(total_duration(&silent, None), 0);
    }
}
