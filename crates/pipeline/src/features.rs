//! Feature extraction for song scoring.
//!
//! Turns the history and preference snapshot held by a [`LibraryIndex`] into
//! one 14-dimensional [`SongFeatures`] vector per song. Extraction is a pure
//! function of `(index, now)`.

use agents::math::decay_for_days;
use music_library::types::{elapsed_days, hour_of_day};
use music_library::{Feature, LibraryIndex, ListeningEvent, Song, SongFeatures, Timestamp};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub recency_half_life_days: f64,
    /// Plays within this many minutes before `now` define the session context
    pub session_gap_minutes: i64,
    /// Hours on either side of the current hour that count as a match
    pub time_of_day_window_hours: u8,
    /// Play count at which play frequency reaches ~63%
    pub play_frequency_scale: f64,
    pub streak_cap: u32,
    /// Completion needed for a play to extend the streak
    pub full_play_completion: f64,
    /// Years of distance at which the era fit reaches zero
    pub era_distance_years: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            recency_half_life_days: 23.0,
            session_gap_minutes: 30,
            time_of_day_window_hours: 2,
            play_frequency_scale: 10.0,
            streak_cap: 5,
            full_play_completion: 0.8,
            era_distance_years: 50.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Vectors for the whole catalog, in catalog order.
    pub fn extract_all(&self, index: &LibraryIndex, now: Timestamp) -> Vec<SongFeatures> {
        let features: Vec<SongFeatures> = index
            .songs()
            .par_iter()
            .map(|song| self.extract_song(index, song, now))
            .collect();
        debug!("Extracted features for {} songs", features.len());
        features
    }

    /// Vector for one song; `None` if the song isn't in the catalog.
    pub fn extract(&self, index: &LibraryIndex, song_id: &str, now: Timestamp) -> Option<SongFeatures> {
        index.song(song_id).map(|song| self.extract_song(index, song, now))
    }

    fn extract_song(&self, index: &LibraryIndex, song: &Song, now: Timestamp) -> SongFeatures {
        let mut features = SongFeatures::neutral(song.id.clone());
        let history = index.history_for(&song.id);

        // Catalog-derived features are defined even without history
        features.set(Feature::GenreAffinity, index.genre_affinity(song.genre.as_deref()));
        features.set(Feature::ArtistAffinity, index.artist_affinity(&song.artist));
        features.set(Feature::AlbumAffinity, index.album_affinity(song.album.as_deref()));
        features.set(Feature::DurationFit, duration_fit(song.duration_ms, index.preferred_duration_ms()));
        features.set(
            Feature::ReleaseEraFit,
            era_fit(song.release_year, index.preferred_era(), self.config.era_distance_years),
        );
        features.set(Feature::Energy, estimated_energy(song.duration_ms));

        let (plays, skips, avg_completion, last_played) = match index.preference(&song.id) {
            Some(record) => (
                record.play_count,
                record.skip_count,
                record.avg_completion_rate,
                record.last_played,
            ),
            None => summarize(history),
        };
        if plays + skips == 0 {
            return features;
        }

        features.set(
            Feature::PlayFrequency,
            1.0 - (-(plays as f64) / self.config.play_frequency_scale.max(f64::EPSILON)).exp(),
        );
        features.set(Feature::AvgCompletionRate, avg_completion.clamp(0.0, 1.0));
        features.set(Feature::SkipRate, skips as f64 / (plays + skips) as f64);
        if let Some(last) = last_played {
            features.set(
                Feature::Recency,
                decay_for_days(elapsed_days(last, now), self.config.recency_half_life_days),
            );
        }
        features.set(Feature::TimeOfDayMatch, self.time_of_day_match(history, now));
        features.set(Feature::ConsecutivePlays, self.streak(history));
        features.set(Feature::SessionContext, self.session_context(history, now));
        if index.max_play_count() > 0 {
            features.set(
                Feature::Popularity,
                plays as f64 / index.max_play_count() as f64,
            );
        }
        features
    }

    /// Share of completed plays that happened near the current hour of day.
    fn time_of_day_match(&self, history: &[ListeningEvent], now: Timestamp) -> f64 {
        let current = hour_of_day(now) as i32;
        let window = self.config.time_of_day_window_hours as i32;
        let plays: Vec<_> = history.iter().filter(|e| !e.skipped).collect();
        if plays.is_empty() {
            return 0.5;
        }
        let near = plays
            .iter()
            .filter(|e| {
                let diff = (e.hour_of_day as i32 - current).rem_euclid(24);
                diff.min(24 - diff) <= window
            })
            .count();
        near as f64 / plays.len() as f64
    }

    /// Trailing run of full plays, scaled by the cap.
    fn streak(&self, history: &[ListeningEvent]) -> f64 {
        let run = history
            .iter()
            .rev()
            .take_while(|e| !e.skipped && e.completion_rate >= self.config.full_play_completion)
            .count() as u32;
        let cap = self.config.streak_cap.max(1);
        run.min(cap) as f64 / cap as f64
    }

    /// -1 skipped, 1 completed, 0 untouched within the current session.
    fn session_context(&self, history: &[ListeningEvent], now: Timestamp) -> f64 {
        let session_start = now - self.config.session_gap_minutes * 60_000;
        match history
            .iter()
            .rev()
            .find(|e| e.timestamp >= session_start && e.timestamp <= now)
        {
            Some(e) if e.skipped => -1.0,
            Some(_) => 1.0,
            None => 0.0,
        }
    }
}

/// (plays, skips, avg completion, last played) straight from raw history.
fn summarize(history: &[ListeningEvent]) -> (u32, u32, f64, Option<Timestamp>) {
    if history.is_empty() {
        return (0, 0, 0.0, None);
    }
    let skips = history.iter().filter(|e| e.skipped).count() as u32;
    let plays = history.len() as u32 - skips;
    let avg = history.iter().map(|e| e.completion_rate).sum::<f64>() / history.len() as f64;
    (plays, skips, avg, history.iter().map(|e| e.timestamp).max())
}

fn duration_fit(duration_ms: u64, preferred_ms: Option<f64>) -> f64 {
    match preferred_ms {
        Some(pref) if duration_ms > 0 && pref > 0.0 => {
            let d = duration_ms as f64;
            1.0 - (d - pref).abs() / d.max(pref)
        }
        _ => 0.5,
    }
}

fn era_fit(year: Option<u16>, era: Option<f64>, max_distance: f64) -> f64 {
    match (year, era) {
        (Some(year), Some(era)) if max_distance > 0.0 => {
            (1.0 - (year as f64 - era).abs() / max_distance).clamp(0.0, 1.0)
        }
        _ => 0.5,
    }
}

/// Rough energy proxy: two-minute tracks score 1, six minutes and longer 0.
fn estimated_energy(duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.5;
    }
    let minutes = duration_ms as f64 / 60_000.0;
    ((6.0 - minutes) / 4.0).clamp(0.0, 1.0)
}
