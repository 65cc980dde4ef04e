//! Profile Model - trainable in-process external scorer
//!
//! ## Scoring
//! 1. Z-score similarity to the listening profile, weighted like the
//!    statistical agent, blended with cosine similarity to the mean vector
//! 2. Skip penalty: `1 - 0.5 * skipRate`
//! 3. Diversity: up to 30% off for resemblance to the last recommended songs
//!
//! Confidence follows the implicit-feedback formula
//! `0.5 * completion + 0.3 * (1 - skipRate) + 0.2 * plays`, clamped.
//!
//! State is kept as JSON in `profile_model.json` inside the model directory.

use crate::clustering::KMeans;
use crate::error::{ModelError, Result};
use crate::profile::UserProfile;
use agents::math::cosine_similarity;
use agents::{AgentScore, ExternalScorer, ScorerError};
use async_trait::async_trait;
use music_library::{Feature, RingBuffer, SongFeatures};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

pub const MODEL_FILE: &str = "profile_model.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub min_samples: usize,
    pub clusters: usize,
    pub kmeans_iterations: usize,
    /// Share of the z-score similarity in the profile blend
    pub profile_weight: f64,
    pub skip_penalty: f64,
    pub diversity_factor: f64,
    /// Recent recommendations compared against for diversity
    pub diversity_window: usize,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// Fixed k-means seed; random when unset
    pub seed: Option<u64>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            clusters: 5,
            kmeans_iterations: 10,
            profile_weight: 0.7,
            skip_penalty: 0.5,
            diversity_factor: 0.3,
            diversity_window: 5,
            min_confidence: 0.3,
            max_confidence: 0.95,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelState {
    trained: bool,
    samples: usize,
    profile: Option<UserProfile>,
    clustering: KMeans,
}

impl ModelState {
    fn untrained(config: &ProfileConfig) -> Self {
        Self {
            trained: false,
            samples: 0,
            profile: None,
            clustering: KMeans::new(config.clusters, config.kmeans_iterations),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub trained: bool,
    pub samples: usize,
    pub clusters: usize,
}

pub struct ProfileModel {
    config: ProfileConfig,
    state: RwLock<ModelState>,
    recent: Mutex<RingBuffer<Vec<f64>>>,
    path: Option<PathBuf>,
}

impl ProfileModel {
    /// A model that never touches the disk.
    pub fn in_memory(config: ProfileConfig) -> Self {
        Self {
            state: RwLock::new(ModelState::untrained(&config)),
            recent: Mutex::new(RingBuffer::with_capacity(config.diversity_window)),
            config,
            path: None,
        }
    }

    /// Load the model persisted in `dir`, or start untrained.
    pub fn open(dir: impl AsRef<Path>, config: ProfileConfig) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| ModelError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(MODEL_FILE);

        let mut model = Self::in_memory(config);
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| ModelError::Io {
                path: path.clone(),
                source,
            })?;
            match serde_json::from_str::<ModelState>(&content) {
                Ok(state) => {
                    info!("Loaded profile model trained on {} samples", state.samples);
                    model.state = RwLock::new(state);
                }
                Err(e) => warn!("Ignoring unreadable model file {}: {}", path.display(), e),
            }
        }
        model.path = Some(path);
        Ok(model)
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    pub fn status(&self) -> ModelStatus {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        ModelStatus {
            trained: state.trained,
            samples: state.samples,
            clusters: state.clustering.centroids.len(),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.status().trained
    }

    /// Score with the diversity adjustment, without touching the recent list.
    pub fn evaluate(&self, features: &[f64]) -> Result<AgentScore> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let profile = match (&state.profile, state.trained) {
            (Some(profile), true) => profile,
            _ => return Ok(AgentScore::new(50.0, self.config.min_confidence * 100.0)),
        };

        let base = profile.score(features, self.config.profile_weight, self.config.skip_penalty)?;
        let penalty = self.diversity_penalty(features)?;
        let score = base * (1.0 - self.config.diversity_factor * penalty) * 100.0;

        let value = |f: Feature| features.get(f.index()).copied().unwrap_or(0.0);
        let plays = value(Feature::PlayFrequency).clamp(0.0, 1.0);
        let completion = value(Feature::AvgCompletionRate);
        let skip_rate = value(Feature::SkipRate);
        let confidence = (0.5 * completion + 0.3 * (1.0 - skip_rate) + 0.2 * plays)
            .clamp(self.config.min_confidence, self.config.max_confidence);

        Ok(AgentScore::new(score, confidence * 100.0))
    }

    /// Mean cosine similarity to the recently recommended vectors.
    fn diversity_penalty(&self, features: &[f64]) -> Result<f64> {
        let recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for vector in recent.iter_newest() {
            total += cosine_similarity(features, vector)?.max(0.0);
        }
        Ok(total / recent.len() as f64)
    }

    pub fn cluster(&self, features: &[f64]) -> Option<usize> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if !state.trained || !state.clustering.is_fitted() {
            return None;
        }
        state.clustering.predict(features).ok()
    }

    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub async fn fit(&self, samples: &[SongFeatures]) -> Result<ModelStatus> {
        let state = self.build_state(samples)?;
        let json = serde_json::to_string(&state)?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
        self.persist(json).await?;

        info!("Profile model trained on {} samples", samples.len());
        Ok(self.status())
    }

    fn build_state(&self, samples: &[SongFeatures]) -> Result<ModelState> {
        if samples.len() < self.config.min_samples {
            return Err(ModelError::InsufficientData {
                needed: self.config.min_samples,
                got: samples.len(),
            });
        }

        let points: Vec<Vec<f64>> = samples.iter().map(|s| s.values.to_vec()).collect();
        let profile = UserProfile::fit(&points)?;
        let mut clustering = KMeans::new(self.config.clusters, self.config.kmeans_iterations);
        match self.config.seed {
            Some(seed) => clustering.fit(&points, &mut StdRng::seed_from_u64(seed))?,
            None => clustering.fit(&points, &mut rand::rng())?,
        }

        Ok(ModelState {
            trained: true,
            samples: samples.len(),
            profile: Some(profile),
            clustering,
        })
    }

    async fn persist(&self, json: String) -> Result<()> {
        if let Some(path) = &self.path {
            tokio::fs::write(path, json).await.map_err(|source| ModelError::Io {
                path: path.clone(),
                source,
            })?;
            debug!("Model saved to {}", path.display());
        }
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = ModelState::untrained(&self.config);
        self.recent.lock().unwrap_or_else(PoisonError::into_inner).clear();
        if let Some(path) = &self.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => info!("Deleted model file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ModelError::Io {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalScorer for ProfileModel {
    fn name(&self) -> &str {
        "profile-model"
    }

    async fn score(&self, features: &SongFeatures) -> std::result::Result<AgentScore, ScorerError> {
        Ok(self.evaluate(features.as_slice())?)
    }

    async fn train(&self, samples: &[SongFeatures]) -> std::result::Result<(), ScorerError> {
        self.fit(samples).await?;
        Ok(())
    }

    async fn reset(&self) -> std::result::Result<(), ScorerError> {
        Ok(self.clear().await?)
    }

    fn note_recommended(&self, picks: &[SongFeatures]) {
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        for pick in picks.iter().rev() {
            recent.push(pick.values.to_vec());
        }
    }

    fn cluster_of(&self, features: &SongFeatures) -> Option<usize> {
        self.cluster(features.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use music_library::FEATURE_COUNT;

    fn sample(id: &str, completion: f64, skip: f64) -> SongFeatures {
        let mut f = SongFeatures::neutral(id);
        f.set(Feature::PlayFrequency, 0.6);
        f.set(Feature::AvgCompletionRate, completion);
        f.set(Feature::SkipRate, skip);
        f.set(Feature::Recency, 0.8);
        f
    }

    fn history() -> Vec<SongFeatures> {
        (0..6)
            .map(|i| sample(&format!("s{i}"), 0.9 - i as f64 * 0.02, 0.05))
            .collect()
    }

    fn seeded() -> ProfileModel {
        ProfileModel::in_memory(ProfileConfig {
            seed: Some(11),
            ..ProfileConfig::default()
        })
    }

    #[tokio::test]
    async fn test_untrained_answer() {
        let model = seeded();
        let score = model.score(&sample("x", 1.0, 0.0)).await.unwrap();
        assert_eq!(score.score, 50.0);
        assert!((score.confidence - 30.0).abs() < 1e-9);
        assert_eq!(model.cluster_of(&sample("x", 1.0, 0.0)), None);
    }

    #[tokio::test]
    async fn test_needs_five_samples() {
        let model = seeded();
        let result = model.train(&history()[..4]).await;
        assert!(matches!(
            result,
            Err(ScorerError::InsufficientData { needed: 5, got: 4 })
        ));
        assert!(!model.is_trained());
    }

    #[tokio::test]
    async fn test_trained_scores_profile_fit_higher() {
        let model = seeded();
        model.train(&history()).await.unwrap();
        assert!(model.is_trained());

        let fit = model.score(&sample("a", 0.85, 0.05)).await.unwrap();
        let misfit = model.score(&sample("b", 0.05, 0.95)).await.unwrap();
        assert!(fit.score > misfit.score);
        assert!(fit.confidence > misfit.confidence);
        assert!(misfit.confidence > 29.999 && misfit.confidence < 95.001);
        assert!(model.cluster_of(&sample("a", 0.85, 0.05)).is_some());
    }

    #[tokio::test]
    async fn test_recommended_songs_reduce_similar_scores() {
        let model = seeded();
        model.train(&history()).await.unwrap();
        let candidate = sample("c", 0.85, 0.05);
        let before = model.score(&candidate).await.unwrap();

        model.note_recommended(&[candidate.clone()]);
        let after = model.score(&candidate).await.unwrap();
        assert!(after.score < before.score);
        // at most a 30% cut
        assert!(after.score >= before.score * 0.7 - 1e-9);
    }

    #[tokio::test]
    async fn test_confidence_clamped() {
        let model = seeded();
        model.train(&history()).await.unwrap();
        let mut perfect = SongFeatures::neutral("p");
        perfect.set(Feature::PlayFrequency, 1.0);
        perfect.set(Feature::AvgCompletionRate, 1.0);
        let score = model.score(&perfect).await.unwrap();
        assert!((score.confidence - 95.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_trained_rejects_wrong_dimensions() {
        let model = seeded();
        // untrained answers regardless of shape
        assert!(model.evaluate(&[0.5; 3]).is_ok());
        model.train(&history()).await.unwrap();
        assert!(model.evaluate(&[0.5; 3]).is_err());
        assert!(model.evaluate(&[0.5; FEATURE_COUNT]).is_ok());
    }
}
