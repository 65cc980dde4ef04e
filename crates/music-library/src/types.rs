//! Core domain types for the on-device music library.
//!
//! The catalog ([`Song`]) and the raw listening stream ([`ListeningEvent`])
//! come from the player. [`PreferenceRecord`] and [`TransitionEdge`] are the
//! only durable learned state; [`SongFeatures`] and [`Recommendation`] are
//! computed on demand and thrown away.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// Identifiers and time
// =============================================================================

/// Unique identifier for a song in the catalog
pub type SongId = String;

/// Milliseconds since the Unix epoch (UTC)
pub type Timestamp = i64;

pub const MILLIS_PER_HOUR: i64 = 3_600_000;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Hour of day (0-23, UTC) for a timestamp.
pub fn hour_of_day(ts: Timestamp) -> u8 {
    ts.div_euclid(MILLIS_PER_HOUR).rem_euclid(24) as u8
}

/// Day of week for a timestamp, 0 = Sunday.
pub fn day_of_week(ts: Timestamp) -> u8 {
    // 1970-01-01 was a Thursday
    (ts.div_euclid(MILLIS_PER_DAY) + 4).rem_euclid(7) as u8
}

/// Elapsed days from `from` to `to`, never negative.
pub fn elapsed_days(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).max(0) as f64 / MILLIS_PER_DAY as f64
}

// =============================================================================
// Catalog
// =============================================================================

/// A song in the local catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    /// Duration in milliseconds, 0 when unknown
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub release_year: Option<u16>,
    /// Backing audio file; songs whose file vanished are cleaned up by maintenance
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Song {
    pub fn new(id: impl Into<SongId>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            genre: None,
            duration_ms: 0,
            release_year: None,
            path: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_release_year(mut self, year: u16) -> Self {
        self.release_year = Some(year);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

// =============================================================================
// Listening history
// =============================================================================

/// One entry of the listening history stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListeningEvent {
    pub song_id: SongId,
    pub timestamp: Timestamp,
    pub listen_duration_ms: u64,
    /// Fraction of the song that was heard, in [0, 1]
    pub completion_rate: f64,
    pub skipped: bool,
    pub hour_of_day: u8,
    pub day_of_week: u8,
}

impl ListeningEvent {
    /// Build an event, deriving completion rate and calendar fields.
    ///
    /// A zero `total_duration_ms` means the duration is unknown and yields a
    /// completion rate of 0.
    pub fn new(
        song_id: impl Into<SongId>,
        timestamp: Timestamp,
        listen_duration_ms: u64,
        total_duration_ms: u64,
        skipped: bool,
    ) -> Self {
        Self {
            song_id: song_id.into(),
            timestamp,
            listen_duration_ms,
            completion_rate: completion_rate(listen_duration_ms, total_duration_ms),
            skipped,
            hour_of_day: hour_of_day(timestamp),
            day_of_week: day_of_week(timestamp),
        }
    }
}

/// `clamp(listen / total, 0, 1)`, or 0 when the total is unknown.
pub fn completion_rate(listen_duration_ms: u64, total_duration_ms: u64) -> f64 {
    if total_duration_ms == 0 {
        return 0.0;
    }
    (listen_duration_ms as f64 / total_duration_ms as f64).clamp(0.0, 1.0)
}

// =============================================================================
// User preference record
// =============================================================================

/// Learned per-song preference state. Mutated only by play and skip events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub song_id: SongId,
    pub play_count: u32,
    pub skip_count: u32,
    /// Rolling average completion over every play and skip
    pub avg_completion_rate: f64,
    pub last_played: Option<Timestamp>,
}

impl PreferenceRecord {
    pub fn new(song_id: impl Into<SongId>) -> Self {
        Self {
            song_id: song_id.into(),
            play_count: 0,
            skip_count: 0,
            avg_completion_rate: 0.0,
            last_played: None,
        }
    }

    /// Derived like-score in [-1, 1]; see [`like_score`].
    pub fn like_score(&self) -> f64 {
        like_score(self.play_count, self.skip_count, self.avg_completion_rate)
    }

    pub fn interactions(&self) -> u32 {
        self.play_count + self.skip_count
    }

    /// Skips per play; a song that was only ever skipped has an infinite ratio.
    pub fn skip_to_play_ratio(&self) -> f64 {
        match (self.skip_count, self.play_count) {
            (0, _) => 0.0,
            (_, 0) => f64::INFINITY,
            (skips, plays) => skips as f64 / plays as f64,
        }
    }

    pub fn record_play(&mut self, completion_rate: f64, at: Timestamp) {
        self.fold_completion(completion_rate);
        self.play_count += 1;
        self.last_played = Some(self.last_played.map_or(at, |prev| prev.max(at)));
    }

    pub fn record_skip(&mut self, completion_rate: f64, at: Timestamp) {
        self.fold_completion(completion_rate);
        self.skip_count += 1;
        self.last_played = Some(self.last_played.map_or(at, |prev| prev.max(at)));
    }

    fn fold_completion(&mut self, completion_rate: f64) {
        let n = self.interactions() as f64;
        let rate = if completion_rate.is_finite() {
            completion_rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.avg_completion_rate = (self.avg_completion_rate * n + rate) / (n + 1.0);
    }
}

/// Pure like-score of a song.
///
/// ```text
/// n      = plays + skips
/// ratio  = (plays - skips) / n
/// like   = (0.6 * ratio + 0.4 * (2 * avg_completion - 1)) * n / (n + 3)
/// ```
///
/// The `n / (n + 3)` volume term keeps sparse histories close to neutral.
pub fn like_score(play_count: u32, skip_count: u32, avg_completion_rate: f64) -> f64 {
    let n = (play_count + skip_count) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let ratio = (play_count as f64 - skip_count as f64) / n;
    let completion = 2.0 * avg_completion_rate.clamp(0.0, 1.0) - 1.0;
    let volume = n / (n + 3.0);
    ((0.6 * ratio + 0.4 * completion) * volume).clamp(-1.0, 1.0)
}

// =============================================================================
// Transition graph
// =============================================================================

/// Directed, weighted "B was played after A" edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub from: SongId,
    pub to: SongId,
    pub weight: f64,
    pub play_count: u32,
    pub skip_count: u32,
    pub avg_completion_rate: f64,
    pub last_occurred: Timestamp,
    /// Time up to which bulk decay has already been folded into `weight`
    #[serde(default)]
    pub decayed_through: Timestamp,
}

impl TransitionEdge {
    pub fn new(from: impl Into<SongId>, to: impl Into<SongId>, weight: f64, at: Timestamp) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
            play_count: 0,
            skip_count: 0,
            avg_completion_rate: 0.0,
            last_occurred: at,
            decayed_through: at,
        }
    }

    /// Point in time from which decay still has to be applied.
    pub fn decay_anchor(&self) -> Timestamp {
        self.last_occurred.max(self.decayed_through)
    }

    pub fn skip_ratio(&self) -> f64 {
        let total = self.play_count + self.skip_count;
        if total == 0 {
            0.0
        } else {
            self.skip_count as f64 / total as f64
        }
    }
}

// =============================================================================
// Feature vectors
// =============================================================================

/// Number of dimensions in a [`SongFeatures`] vector.
pub const FEATURE_COUNT: usize = 14;

/// Named positions inside a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    PlayFrequency = 0,
    AvgCompletionRate,
    SkipRate,
    Recency,
    TimeOfDayMatch,
    GenreAffinity,
    ArtistAffinity,
    ConsecutivePlays,
    /// Signed: -1 skipped this session, 1 completed this session
    SessionContext,
    DurationFit,
    AlbumAffinity,
    ReleaseEraFit,
    Popularity,
    Energy,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::PlayFrequency,
        Feature::AvgCompletionRate,
        Feature::SkipRate,
        Feature::Recency,
        Feature::TimeOfDayMatch,
        Feature::GenreAffinity,
        Feature::ArtistAffinity,
        Feature::ConsecutivePlays,
        Feature::SessionContext,
        Feature::DurationFit,
        Feature::AlbumAffinity,
        Feature::ReleaseEraFit,
        Feature::Popularity,
        Feature::Energy,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-size feature vector for one song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongFeatures {
    pub song_id: SongId,
    pub values: [f64; FEATURE_COUNT],
}

impl SongFeatures {
    /// Vector for a song without any history: neutral affinities, zero activity.
    pub fn neutral(song_id: impl Into<SongId>) -> Self {
        let mut values = [0.0; FEATURE_COUNT];
        for feature in [
            Feature::TimeOfDayMatch,
            Feature::GenreAffinity,
            Feature::ArtistAffinity,
            Feature::DurationFit,
            Feature::AlbumAffinity,
            Feature::ReleaseEraFit,
            Feature::Energy,
        ] {
            values[feature.index()] = 0.5;
        }
        Self {
            song_id: song_id.into(),
            values,
        }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn set(&mut self, feature: Feature, value: f64) {
        self.values[feature.index()] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

// =============================================================================
// Recommendation result
// =============================================================================

/// A scored song produced by one scoring pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub song_id: SongId,
    /// Score in [0, 100]
    pub score: f64,
    /// Confidence in [0, 100]
    pub confidence: f64,
    pub reason: String,
}

impl Recommendation {
    pub fn new(song_id: impl Into<SongId>, score: f64, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            song_id: song_id.into(),
            score: score.clamp(0.0, 100.0),
            confidence: confidence.clamp(0.0, 100.0),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_fields() {
        // 1970-01-01 13:00 UTC, a Thursday
        let ts = 13 * MILLIS_PER_HOUR;
        assert_eq!(hour_of_day(ts), 13);
        assert_eq!(day_of_week(ts), 4);
        assert_eq!(day_of_week(ts + 3 * MILLIS_PER_DAY), 0);
    }

    #[test]
    fn test_completion_rate_bounds() {
        assert_eq!(completion_rate(30_000, 0), 0.0);
        assert_eq!(completion_rate(300_000, 200_000), 1.0);
        assert!((completion_rate(50_000, 200_000) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_like_score_neutral_without_history() {
        assert_eq!(like_score(0, 0, 0.0), 0.0);
        assert_eq!(PreferenceRecord::new("a").like_score(), 0.0);
    }

    #[test]
    fn test_like_score_grows_with_full_plays() {
        let mut record = PreferenceRecord::new("a");
        let mut previous = record.like_score();
        for i in 0..10 {
            record.record_play(1.0, i);
            let current = record.like_score();
            assert!(current > previous, "play {} should raise like score", i + 1);
            assert!(current <= 1.0);
            previous = current;
        }
    }

    #[test]
    fn test_like_score_negative_for_skips() {
        let mut record = PreferenceRecord::new("a");
        for i in 0..4 {
            record.record_skip(0.05, i);
        }
        assert!(record.like_score() < 0.0);
        assert!(record.like_score() >= -1.0);
        assert_eq!(record.skip_to_play_ratio(), f64::INFINITY);
    }

    #[test]
    fn test_rolling_completion_average() {
        let mut record = PreferenceRecord::new("a");
        record.record_play(1.0, 10);
        record.record_skip(0.0, 5);
        assert!((record.avg_completion_rate - 0.5).abs() < 1e-12);
        assert_eq!(record.last_played, Some(10));
    }

    #[test]
    fn test_neutral_features() {
        let features = SongFeatures::neutral("x");
        assert_eq!(features.get(Feature::GenreAffinity), 0.5);
        assert_eq!(features.get(Feature::Recency), 0.0);
        assert_eq!(features.as_slice().len(), FEATURE_COUNT);
    }

    #[test]
    fn test_recommendation_clamps() {
        let rec = Recommendation::new("x", 140.0, -3.0, "test");
        assert_eq!(rec.score, 100.0);
        assert_eq!(rec.confidence, 0.0);
    }
}
