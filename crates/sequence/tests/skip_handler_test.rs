use music_library::{LibraryStore, MemoryStore, Song};
use sequence::{
    SkipConfig, SkipEvent, SkipHandler, SkipPattern, SkipType, TransitionConfig, TransitionEngine,
};
use std::sync::Arc;

const T0: i64 = 1_700_000_000_000;

fn setup() -> (Arc<MemoryStore>, Arc<TransitionEngine>, SkipHandler) {
    let songs = (0..8)
        .map(|i| Song::new(format!("s{i}"), format!("Song {i}"), "Artist").with_duration_ms(200_000))
        .collect();
    let store = Arc::new(MemoryStore::with_catalog(songs));
    let transitions = Arc::new(TransitionEngine::new(TransitionConfig::default()));
    let handler = SkipHandler::new(
        SkipConfig::default(),
        store.clone() as Arc<dyn LibraryStore>,
        transitions.clone(),
    );
    (store, transitions, handler)
}

fn skip(song: &str, previous: Option<&str>, listen_ms: u64, at: i64) -> SkipEvent {
    SkipEvent {
        song_id: song.to_string(),
        previous_song_id: previous.map(str::to_string),
        listen_duration_ms: listen_ms,
        total_duration_ms: 200_000,
        timestamp: at,
    }
}

#[tokio::test]
async fn test_skip_updates_history_preferences_and_graph() {
    let (store, transitions, handler) = setup();
    transitions.record_transition_at("s0", "s1", 1.0, false, T0);
    let before = transitions.edge("s0", "s1").unwrap().weight;

    let outcome = handler
        .handle_skip(skip("s1", Some("s0"), 10_000, T0 + 1_000))
        .await
        .unwrap();

    assert_eq!(outcome.skip_type, SkipType::Early);
    assert!(outcome.like_score < 0.0);
    assert!(outcome.penalty > 0.9);

    let history = store.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].skipped);

    let record = store.preference("s1").await.unwrap().unwrap();
    assert_eq!(record.skip_count, 1);

    let after = transitions.edge("s0", "s1").unwrap().weight;
    assert!(after < before);
    assert_eq!(store.transitions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_frustrated_pattern_is_broadcast() {
    let (_store, _transitions, handler) = setup();
    let mut notices = handler.subscribe();

    for i in 0..3 {
        let outcome = handler
            .handle_skip(skip(&format!("s{i}"), None, 5_000, T0 + i * 20_000))
            .await
            .unwrap();
        if i < 2 {
            assert_eq!(outcome.pattern, SkipPattern::None);
        } else {
            assert_eq!(outcome.pattern, SkipPattern::Frustrated);
        }
    }

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.pattern, SkipPattern::Frustrated);
    assert_eq!(notice.recent_song_ids, vec!["s2", "s1", "s0"]);
}

#[tokio::test]
async fn test_searching_then_reset() {
    let (_store, _transitions, handler) = setup();

    // early, mid, early, mid, mid: two early skips only
    let listens = [5_000, 60_000, 5_000, 60_000, 60_000];
    let mut last = SkipPattern::None;
    for (i, listen) in listens.into_iter().enumerate() {
        last = handler
            .handle_skip(skip(&format!("s{i}"), None, listen, T0 + i as i64 * 30_000))
            .await
            .unwrap()
            .pattern;
    }
    assert_eq!(last, SkipPattern::Searching);

    handler.reset_skip_tracking();
    let next = handler
        .handle_skip(skip("s6", None, 60_000, T0 + 160_000))
        .await
        .unwrap();
    assert_eq!(next.pattern, SkipPattern::None);
}

#[tokio::test]
async fn test_single_late_skip_is_interrupted() {
    let (_store, _transitions, handler) = setup();
    let outcome = handler
        .handle_skip(skip("s0", None, 150_000, T0))
        .await
        .unwrap();
    assert_eq!(outcome.skip_type, SkipType::Late);
    assert_eq!(outcome.pattern, SkipPattern::Interrupted);
}

#[tokio::test]
async fn test_songs_to_avoid_most_skipped_first() {
    let (store, _transitions, handler) = setup();
    for i in 0..3 {
        handler
            .handle_skip(skip("s3", None, 1_000, T0 + i * 400_000))
            .await
            .unwrap();
    }
    handler.handle_skip(skip("s4", None, 1_000, T0)).await.unwrap();

    // s5 is played more than it is skipped
    let mut liked = music_library::PreferenceRecord::new("s5");
    liked.record_play(1.0, T0);
    liked.record_play(1.0, T0);
    liked.record_skip(0.2, T0);
    store.save_preference(liked).await.unwrap();

    let avoid = handler.songs_to_avoid(10).await.unwrap();
    assert_eq!(avoid, vec!["s3".to_string(), "s4".to_string()]);
    assert_eq!(handler.songs_to_avoid(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_replayed_skips_do_not_raise_patterns() {
    let (store, transitions, handler) = setup();
    let mut notices = handler.subscribe();

    for i in 0..4 {
        let outcome = handler
            .replay_skip(skip(&format!("s{i}"), Some("s7"), 5_000, T0 + i * 10_000))
            .await
            .unwrap();
        assert_eq!(outcome.skip_type, SkipType::Early);
        assert_eq!(outcome.pattern, SkipPattern::None);
    }

    // still learned from
    assert_eq!(store.history().await.unwrap().len(), 4);
    assert_eq!(store.preference("s0").await.unwrap().unwrap().skip_count, 1);
    assert_eq!(transitions.edge("s7", "s3").unwrap().skip_count, 1);
    assert_eq!(store.transitions().await.unwrap().len(), 4);

    assert_eq!(handler.current_pattern(T0 + 40_000), SkipPattern::None);
    assert!(notices.try_recv().is_err());
}
