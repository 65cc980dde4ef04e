use music_library::parser::{parse_catalog, parse_history};
use music_library::{load_index, preferences_from_history, LibraryStore, SqliteStore};
use std::fs;
use tempfile::TempDir;

fn write_fixtures(dir: &TempDir) {
    fs::write(
        dir.path().join("catalog.json"),
        r#"[
            {"id": "s1", "title": "Night Drive", "artist": "Lumen", "genre": "Synthwave", "duration_ms": 240000, "release_year": 2015},
            {"id": "s2", "title": "Daybreak", "artist": "Lumen", "genre": "Synthwave", "duration_ms": 200000, "release_year": 2017},
            {"id": "s3", "title": "Static", "artist": "Noise Unit", "genre": "Industrial", "duration_ms": 180000}
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("history.json"),
        r#"[
            {"song_id": "s1", "timestamp": 1000, "listen_duration_ms": 240000},
            {"song_id": "s2", "timestamp": 2000, "listen_duration_ms": 200000},
            {"song_id": "s3", "timestamp": 3000, "listen_duration_ms": 9000, "skipped": true},
            {"song_id": "s1", "timestamp": 4000, "listen_duration_ms": 240000}
        ]"#,
    )
    .unwrap();
}

#[tokio::test]
async fn test_import_into_sqlite_and_index() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir);

    let songs = parse_catalog(&dir.path().join("catalog.json")).unwrap();
    let events = parse_history(&dir.path().join("history.json"), &songs).unwrap();
    assert_eq!(songs.len(), 3);
    assert_eq!(events.len(), 4);

    let store = SqliteStore::open(&dir.path().join("db/library.db3")).unwrap();
    for song in songs {
        store.upsert_song(song).await.unwrap();
    }
    for record in preferences_from_history(&events).into_values() {
        store.save_preference(record).await.unwrap();
    }
    for event in events {
        store.append_event(event).await.unwrap();
    }

    let index = load_index(&store).await.unwrap();
    assert_eq!(index.counts(), (3, 4, 3));
    assert_eq!(index.songs()[0].id, "s1");
    assert_eq!(index.preference("s1").unwrap().play_count, 2);
    assert!(index.genre_affinity(Some("synthwave")) > index.genre_affinity(Some("Industrial")));
    assert_eq!(index.max_play_count(), 2);
}
