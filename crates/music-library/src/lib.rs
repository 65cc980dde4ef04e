//! # Music Library Crate
//!
//! Data model and storage for the on-device recommendation engine.
//!
//! ## Main Components
//!
//! - **types**: Songs, listening events, preference records, transition edges,
//!   feature vectors and recommendation results
//! - **parser**: Parse and validate `catalog.json` / `history.json`
//! - **index**: Immutable [`LibraryIndex`] snapshot with affinity aggregates
//! - **store**: [`LibraryStore`] persistence trait and [`MemoryStore`]
//! - **sqlite_store**: SQLite backend
//! - **ring_buffer**: Fixed-capacity circular buffer
//!
//! ## Example Usage
//!
//! ```ignore
//! use music_library::{load_index, LibraryStore, SqliteStore};
//!
//! let store = SqliteStore::open(Path::new("playwise.db3"))?;
//! let index = load_index(&store).await?;
//! println!("{} songs, {} plays", index.songs().len(), index.timeline().len());
//! ```

pub mod error;
pub mod index;
pub mod parser;
pub mod ring_buffer;
pub mod sqlite_store;
pub mod store;
pub mod types;

pub use error::{LibraryError, Result};
pub use index::{preferences_from_history, LibraryIndex, NEUTRAL_AFFINITY};
pub use ring_buffer::RingBuffer;
pub use sqlite_store::SqliteStore;
pub use store::{load_index, LibraryStore, MemoryStore};
pub use types::{
    completion_rate,
    like_score,
    now_millis,
    // Core types
    Feature,
    ListeningEvent,
    PreferenceRecord,
    Recommendation,
    Song,
    SongFeatures,
    // Aliases and constants
    SongId,
    Timestamp,
    TransitionEdge,
    FEATURE_COUNT,
    MILLIS_PER_DAY,
    MILLIS_PER_HOUR,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_from_replayed_history() {
        let songs = vec![
            Song::new("a", "Alpha", "X").with_duration_ms(100_000),
            Song::new("b", "Beta", "X").with_duration_ms(100_000),
        ];
        let history = vec![
            ListeningEvent::new("a", 1_000, 100_000, 100_000, false),
            ListeningEvent::new("b", 2_000, 5_000, 100_000, true),
        ];
        let prefs = preferences_from_history(&history).into_values().collect();
        let index = LibraryIndex::build(songs, history, prefs);

        assert_eq!(index.counts(), (2, 2, 2));
        assert!(index.preference("a").unwrap().like_score() > 0.0);
        assert!(index.preference("b").unwrap().like_score() < 0.0);
        // Artist X has one liked and one disliked song
        let artist = index.artist_affinity("X");
        assert!(artist > 0.0 && artist < 1.0);
    }
}
