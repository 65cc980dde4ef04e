//! Pluggable external scorer capability.
//!
//! An external model gets a song's feature vector and answers with a score
//! and confidence, or reports that it can't. Callers treat every error as
//! "no external score"; [`NullScorer`] is the default when no model is plugged in.

use crate::math::MathError;
use crate::types::AgentScore;
use async_trait::async_trait;
use music_library::SongFeatures;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScorerError {
    #[error("Scorer unavailable: {0}")]
    Unavailable(String),

    #[error("Insufficient training data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Scorer failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Math(#[from] MathError),
}

#[async_trait]
pub trait ExternalScorer: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, features: &SongFeatures) -> Result<AgentScore, ScorerError>;

    /// Retrain from the feature vectors of the listening history.
    async fn train(&self, _samples: &[SongFeatures]) -> Result<(), ScorerError> {
        Ok(())
    }

    /// Forget all learned state.
    async fn reset(&self) -> Result<(), ScorerError> {
        Ok(())
    }

    /// Called with the songs that were just handed out as recommendations.
    fn note_recommended(&self, _picks: &[SongFeatures]) {}

    /// Group the model places a song in, if it clusters at all.
    fn cluster_of(&self, _features: &SongFeatures) -> Option<usize> {
        None
    }
}

/// Scorer used when no external model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScorer;

#[async_trait]
impl ExternalScorer for NullScorer {
    fn name(&self) -> &str {
        "null"
    }

    async fn score(&self, _features: &SongFeatures) -> Result<AgentScore, ScorerError> {
        Err(ScorerError::Unavailable("no external model configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_scorer_is_unavailable() {
        let scorer = NullScorer;
        let result = scorer.score(&SongFeatures::neutral("a")).await;
        assert!(matches!(result, Err(ScorerError::Unavailable(_))));
        assert!(scorer.train(&[]).await.is_ok());
        assert!(scorer.reset().await.is_ok());
        assert_eq!(scorer.cluster_of(&SongFeatures::neutral("a")), None);
    }
}
