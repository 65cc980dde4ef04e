//! Storage collaborator for catalog, history and learned state.
//!
//! [`LibraryStore`] is the only way the engine reads or writes durable data.
//! [`MemoryStore`] backs tests and ephemeral sessions; the SQLite backend lives
//! in [`crate::sqlite_store`].

use crate::error::Result;
use crate::index::LibraryIndex;
use crate::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// All songs, in insertion order
    async fn catalog(&self) -> Result<Vec<Song>>;

    async fn song(&self, song_id: &str) -> Result<Option<Song>>;

    async fn upsert_song(&self, song: Song) -> Result<()>;

    /// Remove a song with its history, preference record and every transition touching it
    async fn remove_song(&self, song_id: &str) -> Result<()>;

    /// Full listening history, oldest first
    async fn history(&self) -> Result<Vec<ListeningEvent>>;

    async fn append_event(&self, event: ListeningEvent) -> Result<()>;

    async fn preferences(&self) -> Result<Vec<PreferenceRecord>>;

    async fn preference(&self, song_id: &str) -> Result<Option<PreferenceRecord>>;

    async fn save_preference(&self, record: PreferenceRecord) -> Result<()>;

    async fn transitions(&self) -> Result<Vec<TransitionEdge>>;

    async fn save_transition(&self, edge: TransitionEdge) -> Result<()>;

    /// Persist one play or skip as a unit: the event, the song's updated
    /// preference record and the transition edge it touched, if any. Either
    /// all of them are stored or none is.
    async fn record_interaction(
        &self,
        event: ListeningEvent,
        preference: PreferenceRecord,
        edge: Option<TransitionEdge>,
    ) -> Result<()>;

    /// Atomically replace the whole edge set
    async fn replace_transitions(&self, edges: Vec<TransitionEdge>) -> Result<()>;

    /// Wipe history, preferences and transitions; the catalog is kept
    async fn clear_learned_state(&self) -> Result<()>;
}

/// Load a consistent snapshot for one scoring pass.
pub async fn load_index(store: &dyn LibraryStore) -> Result<LibraryIndex> {
    let songs = store.catalog().await?;
    let history = store.history().await?;
    let preferences = store.preferences().await?;
    Ok(LibraryIndex::build(songs, history, preferences))
}

// =============================================================================
// In-memory backend
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    songs: Vec<Song>,
    history: Vec<ListeningEvent>,
    preferences: HashMap<SongId, PreferenceRecord>,
    transitions: HashMap<(SongId, SongId), TransitionEdge>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(songs: Vec<Song>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().unwrap_or_else(PoisonError::into_inner);
            state.songs = songs;
        }
        store
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn catalog(&self) -> Result<Vec<Song>> {
        Ok(self.read(|s| s.songs.clone()))
    }

    async fn song(&self, song_id: &str) -> Result<Option<Song>> {
        Ok(self.read(|s| s.songs.iter().find(|song| song.id == song_id).cloned()))
    }

    async fn upsert_song(&self, song: Song) -> Result<()> {
        self.write(|s| match s.songs.iter_mut().find(|existing| existing.id == song.id) {
            Some(existing) => *existing = song,
            None => s.songs.push(song),
        });
        Ok(())
    }

    async fn remove_song(&self, song_id: &str) -> Result<()> {
        self.write(|s| {
            s.songs.retain(|song| song.id != song_id);
            s.history.retain(|e| e.song_id != song_id);
            s.preferences.remove(song_id);
            s.transitions
                .retain(|(from, to), _| from != song_id && to != song_id);
        });
        Ok(())
    }

    async fn history(&self) -> Result<Vec<ListeningEvent>> {
        let mut history = self.read(|s| s.history.clone());
        history.sort_by_key(|e| e.timestamp);
        Ok(history)
    }

    async fn append_event(&self, event: ListeningEvent) -> Result<()> {
        self.write(|s| s.history.push(event));
        Ok(())
    }

    async fn preferences(&self) -> Result<Vec<PreferenceRecord>> {
        Ok(self.read(|s| s.preferences.values().cloned().collect()))
    }

    async fn preference(&self, song_id: &str) -> Result<Option<PreferenceRecord>> {
        Ok(self.read(|s| s.preferences.get(song_id).cloned()))
    }

    async fn save_preference(&self, record: PreferenceRecord) -> Result<()> {
        self.write(|s| s.preferences.insert(record.song_id.clone(), record));
        Ok(())
    }

    async fn transitions(&self) -> Result<Vec<TransitionEdge>> {
        Ok(self.read(|s| s.transitions.values().cloned().collect()))
    }

    async fn save_transition(&self, edge: TransitionEdge) -> Result<()> {
        self.write(|s| {
            s.transitions
                .insert((edge.from.clone(), edge.to.clone()), edge)
        });
        Ok(())
    }

    async fn record_interaction(
        &self,
        event: ListeningEvent,
        preference: PreferenceRecord,
        edge: Option<TransitionEdge>,
    ) -> Result<()> {
        self.write(|s| {
            s.history.push(event);
            s.preferences.insert(preference.song_id.clone(), preference);
            if let Some(edge) = edge {
                s.transitions.insert((edge.from.clone(), edge.to.clone()), edge);
            }
        });
        Ok(())
    }

    async fn replace_transitions(&self, edges: Vec<TransitionEdge>) -> Result<()> {
        self.write(|s| {
            s.transitions = edges
                .into_iter()
                .map(|e| ((e.from.clone(), e.to.clone()), e))
                .collect();
        });
        Ok(())
    }

    async fn clear_learned_state(&self) -> Result<()> {
        self.write(|s| {
            s.history.clear();
            s.preferences.clear();
            s.transitions.clear();
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::with_catalog(vec![
            Song::new("a", "A", "X").with_duration_ms(100_000),
            Song::new("b", "B", "Y").with_duration_ms(100_000),
        ])
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let store = store();
        store
            .upsert_song(Song::new("a", "A (remaster)", "X"))
            .await
            .unwrap();
        let catalog = store.catalog().await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].title, "A (remaster)");
    }

    #[tokio::test]
    async fn test_remove_song_cascades() {
        let store = store();
        store
            .append_event(ListeningEvent::new("a", 1, 100_000, 100_000, false))
            .await
            .unwrap();
        store.save_preference(PreferenceRecord::new("a")).await.unwrap();
        store
            .save_transition(TransitionEdge::new("a", "b", 1.0, 1))
            .await
            .unwrap();
        store
            .save_transition(TransitionEdge::new("b", "a", 1.0, 1))
            .await
            .unwrap();

        store.remove_song("a").await.unwrap();

        assert!(store.song("a").await.unwrap().is_none());
        assert!(store.history().await.unwrap().is_empty());
        assert!(store.preference("a").await.unwrap().is_none());
        assert!(store.transitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_interaction_writes_all_parts() {
        let store = store();
        let mut record = PreferenceRecord::new("b");
        record.record_play(1.0, 7);
        store
            .record_interaction(
                ListeningEvent::new("b", 7, 100_000, 100_000, false),
                record,
                Some(TransitionEdge::new("a", "b", 1.0, 7)),
            )
            .await
            .unwrap();

        assert_eq!(store.history().await.unwrap().len(), 1);
        assert_eq!(store.preference("b").await.unwrap().unwrap().play_count, 1);
        assert_eq!(store.transitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_keeps_catalog() {
        let store = store();
        store
            .append_event(ListeningEvent::new("b", 5, 1, 100_000, true))
            .await
            .unwrap();
        store.clear_learned_state().await.unwrap();

        let index = load_index(&store).await.unwrap();
        assert_eq!(index.counts(), (2, 0, 0));
    }
}
