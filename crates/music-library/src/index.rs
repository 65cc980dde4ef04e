//! LibraryIndex: an immutable snapshot of catalog, history and preferences.
//!
//! Feature extraction is a pure function of this snapshot, so two extractions
//! over the same snapshot always produce identical vectors.

use crate::types::*;
use std::collections::HashMap;
use tracing::debug;

/// Neutral value for any affinity without supporting data
pub const NEUTRAL_AFFINITY: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    /// Catalog in insertion order
    pub(crate) songs: Vec<Song>,
    pub(crate) positions: HashMap<SongId, usize>,
    /// Listening history per song, oldest first
    pub(crate) song_history: HashMap<SongId, Vec<ListeningEvent>>,
    /// Full listening history, oldest first
    pub(crate) timeline: Vec<ListeningEvent>,
    pub(crate) preferences: HashMap<SongId, PreferenceRecord>,

    pub(crate) genre_affinity: HashMap<String, f64>,
    pub(crate) artist_affinity: HashMap<String, f64>,
    pub(crate) album_affinity: HashMap<String, f64>,

    pub(crate) max_play_count: u32,
    /// Play-weighted duration of liked songs
    pub(crate) preferred_duration_ms: Option<f64>,
    /// Median release year of liked songs
    pub(crate) preferred_era: Option<f64>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot and its aggregate statistics.
    pub fn build(
        songs: Vec<Song>,
        history: Vec<ListeningEvent>,
        preferences: Vec<PreferenceRecord>,
    ) -> Self {
        let mut index = Self::new();
        for song in songs {
            index.insert_song(song);
        }
        for event in history {
            index.insert_event(event);
        }
        for record in preferences {
            index.preferences.insert(record.song_id.clone(), record);
        }
        index.finalize();
        debug!(
            songs = index.songs.len(),
            events = index.timeline.len(),
            preferences = index.preferences.len(),
            "Built library index"
        );
        index
    }

    fn insert_song(&mut self, song: Song) {
        match self.positions.get(&song.id) {
            Some(&pos) => self.songs[pos] = song,
            None => {
                self.positions.insert(song.id.clone(), self.songs.len());
                self.songs.push(song);
            }
        }
    }

    fn insert_event(&mut self, event: ListeningEvent) {
        self.song_history
            .entry(event.song_id.clone())
            .or_default()
            .push(event.clone());
        self.timeline.push(event);
    }

    /// Sort histories and compute the aggregates used by feature extraction.
    fn finalize(&mut self) {
        self.timeline.sort_by_key(|e| e.timestamp);
        for events in self.song_history.values_mut() {
            events.sort_by_key(|e| e.timestamp);
        }
        self.max_play_count = self
            .preferences
            .values()
            .map(|p| p.play_count)
            .max()
            .unwrap_or(0);
        self.compute_affinities();
        self.compute_preferred_duration();
        self.compute_preferred_era();
    }

    fn compute_affinities(&mut self) {
        let mut genre: HashMap<String, (f64, u32)> = HashMap::new();
        let mut artist: HashMap<String, (f64, u32)> = HashMap::new();
        let mut album: HashMap<String, (f64, u32)> = HashMap::new();

        for song in &self.songs {
            let Some(record) = self.preferences.get(&song.id) else {
                continue;
            };
            if record.interactions() == 0 {
                continue;
            }
            let value = (record.like_score() + 1.0) / 2.0;

            let bump = |map: &mut HashMap<String, (f64, u32)>, key: &str| {
                let entry = map.entry(key.to_lowercase()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            };
            bump(&mut artist, &song.artist);
            if let Some(g) = &song.genre {
                bump(&mut genre, g);
            }
            if let Some(a) = &song.album {
                bump(&mut album, a);
            }
        }

        let mean = |map: HashMap<String, (f64, u32)>| -> HashMap<String, f64> {
            map.into_iter()
                .map(|(k, (sum, n))| (k, sum / n as f64))
                .collect()
        };
        self.genre_affinity = mean(genre);
        self.artist_affinity = mean(artist);
        self.album_affinity = mean(album);
    }

    fn compute_preferred_duration(&mut self) {
        let (weighted, plays) = self
            .liked_songs()
            .filter(|(song, _)| song.duration_ms > 0)
            .fold((0.0, 0.0), |(w, n), (song, record)| {
                let plays = record.play_count.max(1) as f64;
                (w + song.duration_ms as f64 * plays, n + plays)
            });
        self.preferred_duration_ms = (plays > 0.0).then(|| weighted / plays);
    }

    fn compute_preferred_era(&mut self) {
        let mut years: Vec<u16> = self
            .liked_songs()
            .filter_map(|(song, _)| song.release_year)
            .collect();
        if years.is_empty() {
            self.preferred_era = None;
            return;
        }
        years.sort_unstable();
        let mid = years.len() / 2;
        let median = if years.len() % 2 == 0 {
            (years[mid - 1] as f64 + years[mid] as f64) / 2.0
        } else {
            years[mid] as f64
        };
        self.preferred_era = Some(median);
    }

    fn liked_songs(&self) -> impl Iterator<Item = (&Song, &PreferenceRecord)> + '_ {
        self.songs.iter().filter_map(|song| {
            self.preferences
                .get(&song.id)
                .filter(|record| record.like_score() > 0.0)
                .map(|record| (song, record))
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn song(&self, song_id: &str) -> Option<&Song> {
        self.positions.get(song_id).map(|&pos| &self.songs[pos])
    }

    pub fn contains(&self, song_id: &str) -> bool {
        self.positions.contains_key(song_id)
    }

    /// History of one song, oldest first; empty for songs never played.
    pub fn history_for(&self, song_id: &str) -> &[ListeningEvent] {
        self.song_history
            .get(song_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Whole listening history, oldest first.
    pub fn timeline(&self) -> &[ListeningEvent] {
        &self.timeline
    }

    pub fn preference(&self, song_id: &str) -> Option<&PreferenceRecord> {
        self.preferences.get(song_id)
    }

    pub fn preferences(&self) -> impl Iterator<Item = &PreferenceRecord> + '_ {
        self.preferences.values()
    }

    pub fn genre_affinity(&self, genre: Option<&str>) -> f64 {
        lookup_affinity(&self.genre_affinity, genre)
    }

    pub fn artist_affinity(&self, artist: &str) -> f64 {
        lookup_affinity(&self.artist_affinity, Some(artist))
    }

    pub fn album_affinity(&self, album: Option<&str>) -> f64 {
        lookup_affinity(&self.album_affinity, album)
    }

    pub fn max_play_count(&self) -> u32 {
        self.max_play_count
    }

    pub fn preferred_duration_ms(&self) -> Option<f64> {
        self.preferred_duration_ms
    }

    pub fn preferred_era(&self) -> Option<f64> {
        self.preferred_era
    }

    /// (songs, events, preference records)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.songs.len(), self.timeline.len(), self.preferences.len())
    }
}

fn lookup_affinity(map: &HashMap<String, f64>, key: Option<&str>) -> f64 {
    key.and_then(|k| map.get(&k.to_lowercase()).copied())
        .unwrap_or(NEUTRAL_AFFINITY)
}

/// Rebuild preference records by replaying a history in timestamp order.
pub fn preferences_from_history(history: &[ListeningEvent]) -> HashMap<SongId, PreferenceRecord> {
    let mut ordered: Vec<&ListeningEvent> = history.iter().collect();
    ordered.sort_by_key(|e| e.timestamp);

    let mut records: HashMap<SongId, PreferenceRecord> = HashMap::new();
    for event in ordered {
        let record = records
            .entry(event.song_id.clone())
            .or_insert_with(|| PreferenceRecord::new(event.song_id.clone()));
        if event.skipped {
            record.record_skip(event.completion_rate, event.timestamp);
        } else {
            record.record_play(event.completion_rate, event.timestamp);
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Song> {
        vec![
            Song::new("s1", "One", "Artist A")
                .with_genre("Rock")
                .with_album("First")
                .with_duration_ms(200_000)
                .with_release_year(1990),
            Song::new("s2", "Two", "Artist A")
                .with_genre("rock")
                .with_duration_ms(300_000)
                .with_release_year(2000),
            Song::new("s3", "Three", "Artist B").with_genre("Jazz"),
        ]
    }

    fn play(id: &str, ts: Timestamp) -> ListeningEvent {
        ListeningEvent::new(id, ts, 200_000, 200_000, false)
    }

    #[test]
    fn test_empty_queries() {
        let index = LibraryIndex::new();
        assert!(index.song("missing").is_none());
        assert!(index.history_for("missing").is_empty());
        assert_eq!(index.genre_affinity(Some("Rock")), NEUTRAL_AFFINITY);
        assert_eq!(index.artist_affinity("Nobody"), NEUTRAL_AFFINITY);
        assert_eq!(index.album_affinity(None), NEUTRAL_AFFINITY);
        assert_eq!(index.counts(), (0, 0, 0));
    }

    #[test]
    fn test_history_sorted_per_song() {
        let history = vec![play("s1", 30), play("s1", 10), play("s2", 20)];
        let index = LibraryIndex::build(catalog(), history, vec![]);

        let ts: Vec<_> = index.history_for("s1").iter().map(|e| e.timestamp).collect();
        assert_eq!(ts, vec![10, 30]);
        let timeline: Vec<_> = index.timeline().iter().map(|e| e.timestamp).collect();
        assert_eq!(timeline, vec![10, 20, 30]);
    }

    #[test]
    fn test_affinities_from_preferences() {
        let history: Vec<_> = (0..5).map(|i| play("s1", i)).collect();
        let prefs = preferences_from_history(&history).into_values().collect();
        let index = LibraryIndex::build(catalog(), history, prefs);

        // Genre keys are case-insensitive
        assert!(index.genre_affinity(Some("ROCK")) > NEUTRAL_AFFINITY);
        assert!(index.artist_affinity("Artist A") > NEUTRAL_AFFINITY);
        assert_eq!(index.genre_affinity(Some("Jazz")), NEUTRAL_AFFINITY);
        assert_eq!(index.max_play_count(), 5);
        assert_eq!(index.preferred_duration_ms(), Some(200_000.0));
        assert_eq!(index.preferred_era(), Some(1990.0));
    }

    #[test]
    fn test_preferences_replay_in_order() {
        let history = vec![
            ListeningEvent::new("s1", 50, 10_000, 200_000, true),
            play("s1", 10),
        ];
        let records = preferences_from_history(&history);
        let record = &records["s1"];
        assert_eq!(record.play_count, 1);
        assert_eq!(record.skip_count, 1);
        assert_eq!(record.last_played, Some(50));
    }
}
