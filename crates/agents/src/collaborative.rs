//! Collaborative Scorer - "sounds like what you already like"
//!
//! ## Algorithm
//! 1. Training stores the feature vector and like-score of every song the
//!    user has interacted with in the [`VectorStore`]
//! 2. Scoring looks up the `top_k` nearest stored vectors (excluding the song itself)
//! 3. Score = similarity-weighted mean of the neighbours' like-scores mapped to [0, 100]
//! 4. Confidence = mean neighbour similarity scaled by how many neighbours were
//!    found and by the queried song's own play frequency, so a song nobody
//!    has listened to yet stays at zero confidence

use crate::math;
use crate::types::AgentScore;
use crate::vector_store::VectorStore;
use music_library::{Feature, SongFeatures, SongId};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaborativeConfig {
    /// Neighbours considered per query
    pub top_k: usize,
    /// Neighbours at or below this similarity are ignored
    pub min_similarity: f64,
}

impl Default for CollaborativeConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_similarity: 0.0,
        }
    }
}

pub struct CollaborativeScorer {
    vectors: Arc<VectorStore>,
    likes: RwLock<HashMap<SongId, f64>>,
    config: CollaborativeConfig,
}

impl CollaborativeScorer {
    pub fn new(vectors: Arc<VectorStore>) -> Self {
        Self {
            vectors,
            likes: RwLock::new(HashMap::new()),
            config: CollaborativeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CollaborativeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.vectors
    }

    /// Replace the learned neighbourhood with `(features, like_score)` samples.
    #[instrument(skip(self, samples), fields(samples = samples.len()))]
    pub fn train(&self, samples: &[(SongFeatures, f64)]) -> math::Result<()> {
        let mut likes = HashMap::with_capacity(samples.len());
        self.vectors.clear();
        for (features, like) in samples {
            self.vectors
                .store(features.song_id.clone(), features.values.to_vec())?;
            likes.insert(features.song_id.clone(), like.clamp(-1.0, 1.0));
        }
        *self.likes.write().unwrap_or_else(PoisonError::into_inner) = likes;
        debug!("Collaborative scorer trained on {} songs", samples.len());
        Ok(())
    }

    pub fn analyze(&self, features: &SongFeatures) -> math::Result<AgentScore> {
        if self.vectors.size() == 0 {
            return Ok(AgentScore::neutral());
        }

        let neighbours = self
            .vectors
            .find_similar(features.as_slice(), self.config.top_k + 1)?;
        let likes = self.likes.read().unwrap_or_else(PoisonError::into_inner);

        let (mut weighted, mut total_sim, mut count) = (0.0, 0.0, 0usize);
        for (id, sim) in neighbours
            .iter()
            .filter(|(id, _)| *id != features.song_id)
            .take(self.config.top_k)
        {
            if *sim <= self.config.min_similarity {
                continue;
            }
            let like = likes.get(id).copied().unwrap_or(0.0);
            weighted += sim * (like + 1.0) / 2.0;
            total_sim += sim;
            count += 1;
        }

        if count == 0 || total_sim == 0.0 {
            return Ok(AgentScore::neutral());
        }

        let score = weighted / total_sim * 100.0;
        let mean_sim = total_sim / count as f64;
        let coverage = (count as f64 / self.config.top_k.max(1) as f64).min(1.0);
        let volume = features.get(Feature::PlayFrequency).clamp(0.0, 1.0);
        Ok(AgentScore::new(score, mean_sim * coverage * volume * 100.0))
    }

    pub fn forget(&self, song_id: &str) {
        self.vectors.remove(song_id);
        self.likes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(song_id);
    }

    pub fn clear(&self) {
        self.vectors.clear();
        self.likes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
