//! # Recommendation Manager
//!
//! Owns every engine component and exposes the public API:
//! 1. Load a library snapshot from the store
//! 2. Extract feature vectors (blocking pool, rayon inside)
//! 3. Score every song concurrently: statistical, collaborative and the
//!    optional external model run side by side, then fuse
//! 4. Rank the fused list into quick picks
//!
//! Playback events take a separate path: they mutate preference records and
//! the transition graph under a single learner lock, inside spawned tasks so
//! a caller that goes away can't leave an update half-applied.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::types::{Explanation, MaintenanceSummary, PlayEvent, TrainingReport};
use agents::{AgentScore, CollaborativeScorer, ExternalScorer, NullScorer, StatisticalScorer, VectorStore};
use music_library::{
    load_index, now_millis, LibraryIndex, LibraryStore, ListeningEvent, PreferenceRecord,
    Recommendation, SongFeatures, SongId, Timestamp,
};
use pipeline::{FeatureExtractor, FusionBranch, RecommendationAgent, ScoreFusion};
use sequence::{MagneticPair, PatternNotice, SkipEvent, SkipHandler, SkipOutcome, TransitionEngine};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct RecommendationManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn LibraryStore>,
    extractor: FeatureExtractor,
    statistical: StatisticalScorer,
    collaborative: CollaborativeScorer,
    external: Arc<dyn ExternalScorer>,
    fusion: ScoreFusion,
    transitions: Arc<TransitionEngine>,
    pub(crate) skips: SkipHandler,
    agent: Mutex<RecommendationAgent>,
    /// Serializes every mutation of learned state
    learner: tokio::sync::Mutex<()>,
    maintenance: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

impl RecommendationManager {
    /// Build the engine over `store`, restoring the persisted transition graph.
    ///
    /// Without an external scorer fusion always uses the agent-only blend.
    pub async fn init(
        store: Arc<dyn LibraryStore>,
        config: EngineConfig,
        external: Option<Arc<dyn ExternalScorer>>,
    ) -> Result<Self> {
        config.validate()?;

        let transitions = Arc::new(TransitionEngine::new(config.transitions.clone()));
        let edges = store.transitions().await?;
        let edge_count = edges.len();
        transitions.restore(edges);

        let external: Arc<dyn ExternalScorer> = match external {
            Some(scorer) => scorer,
            None => Arc::new(NullScorer),
        };
        info!(
            "Initializing recommendation engine ({} transitions, external scorer: {})",
            edge_count,
            external.name()
        );

        let inner = ManagerInner {
            extractor: FeatureExtractor::new(config.features.clone()),
            statistical: StatisticalScorer::new(),
            collaborative: CollaborativeScorer::new(Arc::new(VectorStore::new()))
                .with_config(config.collaborative.clone()),
            fusion: ScoreFusion::new(config.fusion.clone()),
            skips: SkipHandler::new(config.skips.clone(), store.clone(), transitions.clone()),
            agent: Mutex::new(RecommendationAgent::new(config.quick_picks.clone())),
            learner: tokio::sync::Mutex::new(()),
            maintenance: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            external,
            transitions,
            store,
            config,
        };
        let manager = Self {
            inner: Arc::new(inner),
        };

        let index = manager.snapshot().await?;
        let features = manager.extract_features(index.clone(), now_millis()).await?;
        manager.inner.train_collaborative(&index, &features)?;
        Ok(manager)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.inner.store
    }

    /// Stop background maintenance. In-flight event updates still finish.
    pub fn shutdown(&self) {
        info!("Shutting down recommendation engine");
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    // =========================================================================
    // Scoring pass
    // =========================================================================

    pub async fn generate_recommendations(&self, count: usize) -> Result<Vec<Recommendation>> {
        self.generate_recommendations_cancellable(count, CancellationToken::new())
            .await
    }

    /// Full scoring pass that gives up as soon as `cancel` fires.
    ///
    /// Scoring never mutates learned state, so an abandoned pass leaves
    /// nothing behind. Dropping the returned future aborts the scoring tasks too.
    #[instrument(skip(self, cancel))]
    pub async fn generate_recommendations_cancellable(
        &self,
        count: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<Recommendation>> {
        let start = Instant::now();
        let now = now_millis();

        let index = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            index = self.snapshot() => index?,
        };
        let features = self.extract_features(index, now).await?;
        if features.is_empty() {
            info!("Library is empty, no recommendations");
            return Ok(Vec::new());
        }

        let by_id: HashMap<SongId, SongFeatures> = features
            .iter()
            .map(|f| (f.song_id.clone(), f.clone()))
            .collect();

        let mut tasks = JoinSet::new();
        for song_features in features {
            let inner = self.inner.clone();
            tasks.spawn(async move { inner.score_song(&song_features).await });
        }

        let mut fused = Vec::with_capacity(by_id.len());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    info!("Recommendation pass cancelled after {} of {} songs", fused.len(), by_id.len());
                    return Err(EngineError::Cancelled);
                }
                next = tasks.join_next() => match next {
                    Some(Ok(recommendation)) => fused.push(recommendation),
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                }
            }
        }

        let picks = self
            .inner
            .agent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_quick_picks(fused, count)?;

        let picked: Vec<SongFeatures> = picks
            .iter()
            .filter_map(|p| by_id.get(&p.song_id).cloned())
            .collect();
        self.inner.external.note_recommended(&picked);

        info!(
            "Generated {} recommendations from {} songs in {:.2?}",
            picks.len(),
            by_id.len(),
            start.elapsed()
        );
        Ok(picks)
    }

    async fn snapshot(&self) -> Result<Arc<LibraryIndex>> {
        Ok(Arc::new(load_index(self.inner.store.as_ref()).await?))
    }

    async fn extract_features(&self, index: Arc<LibraryIndex>, now: Timestamp) -> Result<Vec<SongFeatures>> {
        let inner = self.inner.clone();
        let features = tokio::task::spawn_blocking(move || inner.extractor.extract_all(&index, now)).await?;
        Ok(features)
    }

    /// Per-song breakdown of how the current score comes about.
    pub async fn explain_song(&self, song_id: &str) -> Result<Option<Explanation>> {
        let now = now_millis();
        let index = self.snapshot().await?;
        let (Some(song), Some(features)) = (
            index.song(song_id).cloned(),
            self.inner.extractor.extract(&index, song_id, now),
        ) else {
            return Ok(None);
        };

        let (statistical, collaborative, external) = self.inner.score_parts(&features).await;
        let fused = self
            .inner
            .fusion
            .fuse(song_id, statistical, collaborative, external);

        Ok(Some(Explanation {
            external_used: self.inner.fusion.branch(external.as_ref()) == FusionBranch::WithExternal,
            cluster: self.inner.external.cluster_of(&features),
            sequence_strength: self.inner.transitions.analyze_sequence_strength(song_id, now),
            preference: index.preference(song_id).cloned(),
            song,
            features,
            statistical,
            collaborative,
            external,
            fused,
        }))
    }

    // =========================================================================
    // Sequencing
    // =========================================================================

    pub fn next_song_candidates(&self, current: &str, exclude: &[SongId], limit: usize) -> Vec<Recommendation> {
        self.inner.transitions.next_song_candidates(current, exclude, limit)
    }

    pub fn select_next_song(&self, current: &str, exclude: &[SongId]) -> Option<SongId> {
        self.inner.transitions.select_next_song(current, exclude)
    }

    pub fn hub_songs(&self, limit: usize) -> Vec<(SongId, f64)> {
        self.inner.transitions.hub_songs(limit, now_millis())
    }

    pub fn magnetic_pairs(&self, limit: usize) -> Vec<MagneticPair> {
        self.inner.transitions.magnetic_pairs(limit, now_millis())
    }

    pub fn transition_count(&self) -> usize {
        self.inner.transitions.len()
    }

    // =========================================================================
    // Event sinks
    // =========================================================================

    /// Record a completed play; returns the song's updated preference record.
    pub async fn on_song_completed(&self, event: PlayEvent) -> Result<PreferenceRecord> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.apply_play(event).await }).await?
    }

    pub async fn on_song_skipped(&self, event: SkipEvent) -> Result<SkipOutcome> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.apply_skip(event, true).await }).await?
    }

    /// The user picked a song explicitly; recent skips no longer say anything.
    pub fn on_user_selected_song(&self) {
        self.inner.skips.reset_skip_tracking();
    }

    pub fn subscribe_skip_patterns(&self) -> broadcast::Receiver<PatternNotice> {
        self.inner.skips.subscribe()
    }

    pub async fn songs_to_avoid(&self, limit: usize) -> Result<Vec<SongId>> {
        Ok(self.inner.skips.songs_to_avoid(limit).await?)
    }

    // =========================================================================
    // Training and maintenance
    // =========================================================================

    /// Refit the collaborative neighbourhood and, with enough history, the external model.
    #[instrument(skip(self))]
    pub async fn train_models(&self) -> Result<TrainingReport> {
        let index = self.snapshot().await?;
        let features = self.extract_features(index.clone(), now_millis()).await?;
        let collaborative_songs = self.inner.train_collaborative(&index, &features)?;

        let samples: Vec<SongFeatures> = features
            .into_iter()
            .filter(|f| index.preference(&f.song_id).is_some_and(|p| p.interactions() > 0))
            .collect();

        let mut report = TrainingReport {
            collaborative_songs,
            external_samples: samples.len(),
            external_trained: false,
        };
        if samples.len() < self.inner.config.maintenance.training_min_samples {
            debug!("Skipping external training: only {} samples", samples.len());
            return Ok(report);
        }

        match self.inner.external.train(&samples).await {
            Ok(()) => report.external_trained = true,
            Err(e) => warn!(scorer = self.inner.external.name(), "External training failed: {}", e),
        }
        info!(
            collaborative = report.collaborative_songs,
            external = report.external_trained,
            "Models trained"
        );
        Ok(report)
    }

    /// Remove vanished songs, decay and prune the transition graph, persist
    /// it, then retrain. Safe to repeat: decay already folded in is not applied twice.
    #[instrument(skip(self))]
    pub async fn perform_maintenance(&self) -> Result<MaintenanceSummary> {
        let _running = self.inner.maintenance.lock().await;
        let start = Instant::now();

        let removed_songs = if self.inner.config.maintenance.remove_missing_files {
            self.inner.remove_missing_songs().await?
        } else {
            Vec::new()
        };

        let transitions = {
            let _learner = self.inner.learner.lock().await;
            let engine = self.inner.transitions.clone();
            let now = now_millis();
            let (report, edges) = tokio::task::spawn_blocking(move || {
                let report = engine.perform_maintenance_at(now);
                (report, engine.snapshot())
            })
            .await?;
            self.inner.store.replace_transitions(edges).await?;
            report
        };

        let training = self.train_models().await?;
        info!(
            removed = removed_songs.len(),
            pruned = transitions.pruned,
            "Maintenance finished in {:.2?}",
            start.elapsed()
        );
        Ok(MaintenanceSummary {
            transitions,
            removed_songs,
            training,
        })
    }

    /// Run maintenance every `maintenance.interval_secs` until [`Self::shutdown`].
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.config.maintenance.interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            info!("Maintenance scheduled every {:?}", period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Maintenance loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = manager.perform_maintenance().await {
                            warn!("Maintenance pass failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Forget everything learned: history, preferences, transitions, models.
    /// The catalog is kept.
    pub async fn clear_model_data(&self) -> Result<()> {
        let _learner = self.inner.learner.lock().await;
        self.inner.store.clear_learned_state().await?;
        self.inner.transitions.clear();
        self.inner.collaborative.clear();
        self.inner
            .agent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear_history();
        self.inner.skips.reset_skip_tracking();
        self.inner.external.reset().await?;
        info!("All learned state cleared");
        Ok(())
    }

    pub(crate) fn inner(&self) -> &Arc<ManagerInner> {
        &self.inner
    }
}

impl ManagerInner {
    async fn score_song(&self, features: &SongFeatures) -> Recommendation {
        let (statistical, collaborative, external) = self.score_parts(features).await;
        self.fusion
            .fuse(&features.song_id, statistical, collaborative, external)
    }

    async fn score_parts(&self, features: &SongFeatures) -> (AgentScore, AgentScore, Option<AgentScore>) {
        tokio::join!(
            async { self.statistical.analyze(features) },
            async {
                self.collaborative.analyze(features).unwrap_or_else(|e| {
                    debug!(song_id = %features.song_id, "Collaborative scorer failed: {}", e);
                    AgentScore::neutral()
                })
            },
            self.external_score(features),
        )
    }

    /// Failures and timeouts both mean "no external score".
    async fn external_score(&self, features: &SongFeatures) -> Option<AgentScore> {
        match timeout(self.config.scoring.external_timeout(), self.external.score(features)).await {
            Ok(Ok(score)) => Some(score),
            Ok(Err(e)) => {
                debug!(
                    scorer = self.external.name(),
                    song_id = %features.song_id,
                    "No external score ({}), using agent-only placeholder",
                    e
                );
                None
            }
            Err(_) => {
                warn!(
                    scorer = self.external.name(),
                    song_id = %features.song_id,
                    "External scorer timed out"
                );
                None
            }
        }
    }

    fn train_collaborative(&self, index: &LibraryIndex, features: &[SongFeatures]) -> Result<usize> {
        let samples: Vec<(SongFeatures, f64)> = features
            .iter()
            .filter_map(|f| {
                index
                    .preference(&f.song_id)
                    .filter(|p| p.interactions() > 0)
                    .map(|p| (f.clone(), p.like_score()))
            })
            .collect();
        self.collaborative.train(&samples)?;
        Ok(samples.len())
    }

    /// Persist first, then touch the in-memory graph: a failed write changes nothing.
    pub(crate) async fn apply_play(&self, event: PlayEvent) -> Result<PreferenceRecord> {
        let _learner = self.learner.lock().await;

        let listened = ListeningEvent::new(
            event.song_id.clone(),
            event.timestamp,
            event.listen_duration_ms,
            event.total_duration_ms,
            false,
        );
        let completion = listened.completion_rate;

        let mut record = self
            .store
            .preference(&event.song_id)
            .await?
            .unwrap_or_else(|| PreferenceRecord::new(event.song_id.clone()));
        record.record_play(completion, event.timestamp);

        let edge = event
            .previous_song_id
            .as_deref()
            .filter(|previous| *previous != event.song_id)
            .map(|previous| {
                self.transitions.preview_transition_at(
                    previous,
                    &event.song_id,
                    completion,
                    event.is_repeat,
                    event.timestamp,
                )
            });

        self.store
            .record_interaction(listened, record.clone(), edge.clone())
            .await?;
        if let Some(edge) = edge {
            self.transitions.install(edge);
        }

        debug!(song_id = %event.song_id, like = record.like_score(), "Play recorded");
        Ok(record)
    }

    /// `live` skips feed pattern detection; replayed history doesn't.
    pub(crate) async fn apply_skip(&self, event: SkipEvent, live: bool) -> Result<SkipOutcome> {
        let _learner = self.learner.lock().await;
        let outcome = if live {
            self.skips.handle_skip(event).await?
        } else {
            self.skips.replay_skip(event).await?
        };
        Ok(outcome)
    }

    /// Drop catalog songs whose file path is set but gone, with all their state.
    async fn remove_missing_songs(&self) -> Result<Vec<SongId>> {
        let mut missing = Vec::new();
        for song in self.store.catalog().await? {
            let Some(path) = song.path.as_ref() else {
                continue;
            };
            // unreadable is not the same as gone
            if let Ok(false) = tokio::fs::try_exists(path).await {
                missing.push(song.id);
            }
        }
        if missing.is_empty() {
            return Ok(missing);
        }

        let _learner = self.learner.lock().await;
        for song_id in &missing {
            self.store.remove_song(song_id).await?;
            let edges = self.transitions.remove_song(song_id);
            self.collaborative.forget(song_id);
            info!(song_id = %song_id, edges, "Removed song whose file is gone");
        }
        Ok(missing)
    }
}
