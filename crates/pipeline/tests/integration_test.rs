//! Integration tests for the pipeline.
//!
//! Extraction, agent scoring, fusion and quick picks over a small library.

use agents::{AgentScore, CollaborativeScorer, StatisticalScorer, VectorStore};
use music_library::{
    preferences_from_history, Feature, LibraryIndex, ListeningEvent, Song, MILLIS_PER_DAY,
};
use pipeline::{FeatureExtractor, RecommendationAgent, ScoreFusion};
use std::sync::Arc;

const NOW: i64 = 1_700_000_000_000;

fn create_test_index() -> LibraryIndex {
    let songs = vec![
        Song::new("loved", "Loved", "Band A").with_genre("Rock").with_duration_ms(200_000),
        Song::new("liked", "Liked", "Band A").with_genre("Rock").with_duration_ms(210_000),
        Song::new("skipped", "Skipped", "Band B").with_genre("Jazz").with_duration_ms(300_000),
        Song::new("fresh", "Fresh", "Band C").with_genre("Pop").with_duration_ms(190_000),
    ];

    let mut history = Vec::new();
    for day in 1..=8 {
        history.push(ListeningEvent::new("loved", NOW - day * MILLIS_PER_DAY, 200_000, 200_000, false));
    }
    for day in 1..=3 {
        history.push(ListeningEvent::new("liked", NOW - day * MILLIS_PER_DAY - 1_000, 190_000, 210_000, false));
    }
    for day in 1..=4 {
        history.push(ListeningEvent::new("skipped", NOW - day * MILLIS_PER_DAY - 2_000, 9_000, 300_000, true));
    }
    history.sort_by_key(|e| e.timestamp);

    let prefs = preferences_from_history(&history).into_values().collect();
    LibraryIndex::build(songs, history, prefs)
}

#[test]
fn test_full_scoring_pass() {
    let index = create_test_index();
    let features = FeatureExtractor::default().extract_all(&index, NOW);
    assert_eq!(features.len(), 4);

    let statistical = StatisticalScorer::new();
    let collaborative = CollaborativeScorer::new(Arc::new(VectorStore::new()));
    let samples: Vec<_> = features
        .iter()
        .filter_map(|f| index.preference(&f.song_id).map(|p| (f.clone(), p.like_score())))
        .collect();
    collaborative.train(&samples).unwrap();

    let fusion = ScoreFusion::default();
    let fused: Vec<_> = features
        .iter()
        .map(|f| {
            fusion.fuse(
                &f.song_id,
                statistical.analyze(f),
                collaborative.analyze(f).unwrap(),
                None,
            )
        })
        .collect();

    let statistical_of = |id: &str| {
        statistical.analyze(features.iter().find(|f| f.song_id == id).unwrap())
    };
    assert!(statistical_of("loved").score > statistical_of("skipped").score);
    assert_eq!(statistical_of("fresh").confidence, 0.0);
    assert!(fused.iter().all(|r| (0.0..=100.0).contains(&r.score)));

    let mut agent = RecommendationAgent::default();
    let picks = agent.generate_quick_picks(fused.clone(), 2).unwrap();
    assert_eq!(picks.len(), 2);

    // picks are not repeated on the next call
    let next = agent.generate_quick_picks(fused, 4).unwrap();
    assert_eq!(next.len(), 2);
    assert!(next.iter().all(|n| picks.iter().all(|p| p.song_id != n.song_id)));
}

#[test]
fn test_affinities_flow_into_features() {
    let index = create_test_index();
    let extractor = FeatureExtractor::default();
    let liked = extractor.extract(&index, "liked", NOW).unwrap();
    let skipped = extractor.extract(&index, "skipped", NOW).unwrap();
    let fresh = extractor.extract(&index, "fresh", NOW).unwrap();

    assert!(liked.get(Feature::GenreAffinity) > 0.5);
    assert!(skipped.get(Feature::GenreAffinity) < 0.5);
    assert_eq!(fresh.get(Feature::GenreAffinity), 0.5);
    assert_eq!(skipped.get(Feature::SkipRate), 1.0);
    assert!(extractor.extract(&index, "missing", NOW).is_none());
}

#[test]
fn test_confident_external_changes_ranking() {
    let fusion = ScoreFusion::default();
    let statistical = AgentScore::new(60.0, 70.0);
    let collaborative = AgentScore::new(60.0, 70.0);

    let a = fusion.fuse("a", statistical, collaborative, Some(AgentScore::new(10.0, 95.0)));
    let b = fusion.fuse("b", statistical, collaborative, Some(AgentScore::new(10.0, 40.0)));
    assert!(a.score < b.score);
    assert!((b.score - 60.0).abs() < 1e-9);
}
