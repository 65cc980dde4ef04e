//! Statistical Scorer - closed-form weighted feature scoring
//!
//! ## Algorithm
//! 1. Map every feature onto [0, 1] with "higher is better" orientation
//!    (skip rate is inverted, the signed session flag is shifted)
//! 2. Dot with a fixed weight vector that sums to 1.0
//! 3. Rescale to [-1, 1] with `2x - 1`, squash through a sigmoid, scale to [0, 100]
//!
//! Confidence blends history volume, completion rate and inverse skip rate.
//! A song without plays has zero volume and therefore zero confidence.

use crate::math::{self, MathError};
use crate::types::AgentScore;
use music_library::{Feature, SongFeatures, FEATURE_COUNT};
use tracing::trace;

/// Hand-tuned weights, indexed by [`Feature`]. Completion and skip behaviour
/// dominate; tempo/energy and popularity are minor signals.
pub const DEFAULT_FEATURE_WEIGHTS: [f64; FEATURE_COUNT] = [
    0.10, // play frequency
    0.18, // average completion rate
    0.12, // skip rate (inverted)
    0.10, // recency
    0.08, // time of day match
    0.08, // genre affinity
    0.08, // artist affinity
    0.04, // consecutive plays
    0.04, // session context
    0.06, // duration fit
    0.05, // album affinity
    0.03, // release era fit
    0.02, // popularity
    0.02, // energy
];

#[derive(Debug, Clone)]
pub struct StatisticalScorer {
    weights: [f64; FEATURE_COUNT],
}

impl Default for StatisticalScorer {
    fn default() -> Self {
        Self {
            weights: DEFAULT_FEATURE_WEIGHTS,
        }
    }
}

impl StatisticalScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom weights. They must be finite and non-negative; they are rescaled to sum to 1.0.
    pub fn with_weights(weights: [f64; FEATURE_COUNT]) -> math::Result<Self> {
        if let Some(index) = weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(MathError::NonFinite { index });
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            if total == 0.0 {
                return Err(MathError::Empty);
            }
            let mut scaled = weights;
            for w in &mut scaled {
                *w /= total;
            }
            return Ok(Self { weights: scaled });
        }
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[f64; FEATURE_COUNT] {
        &self.weights
    }

    /// Orient a raw feature vector so that every component is in [0, 1] and higher is better.
    pub fn signal(features: &SongFeatures) -> [f64; FEATURE_COUNT] {
        let mut signal = [0.0; FEATURE_COUNT];
        for feature in Feature::ALL {
            let raw = features.get(feature);
            let raw = if raw.is_finite() { raw } else { 0.0 };
            signal[feature.index()] = match feature {
                Feature::SkipRate => 1.0 - raw,
                Feature::SessionContext => (raw + 1.0) / 2.0,
                _ => raw,
            }
            .clamp(0.0, 1.0);
        }
        signal
    }

    pub fn analyze(&self, features: &SongFeatures) -> AgentScore {
        let signal = Self::signal(features);
        let linear: f64 = signal.iter().zip(&self.weights).map(|(s, w)| s * w).sum();
        let score = math::sigmoid(2.0 * linear - 1.0) * 100.0;

        let volume = signal[Feature::PlayFrequency.index()];
        let completion = signal[Feature::AvgCompletionRate.index()];
        let inverse_skip = signal[Feature::SkipRate.index()];
        let confidence = 100.0 * volume * (0.4 + 0.35 * completion + 0.25 * inverse_skip);

        trace!(song_id = %features.song_id, score, confidence, "Statistical score");
        AgentScore::new(score, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(values: [f64; FEATURE_COUNT]) -> SongFeatures {
        SongFeatures {
            song_id: "s".to_string(),
            values,
        }
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let total: f64 = DEFAULT_FEATURE_WEIGHTS.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_for_extremes() {
        let scorer = StatisticalScorer::new();
        for values in [[0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT], [-1.0; FEATURE_COUNT], [5.0; FEATURE_COUNT]] {
            let result = scorer.analyze(&features(values));
            assert!((0.0..=100.0).contains(&result.score));
            assert!((0.0..=100.0).contains(&result.confidence));
        }
    }

    #[test]
    fn test_new_song_has_zero_confidence() {
        let scorer = StatisticalScorer::new();
        let result = scorer.analyze(&SongFeatures::neutral("new"));
        assert_eq!(result.confidence, 0.0);
        assert!(result.score > 0.0 && result.score < 100.0);
    }

    #[test]
    fn test_skips_lower_score() {
        let scorer = StatisticalScorer::new();
        let mut liked = SongFeatures::neutral("a");
        liked.set(Feature::PlayFrequency, 0.6);
        liked.set(Feature::AvgCompletionRate, 0.95);
        let mut skipped = liked.clone();
        skipped.set(Feature::SkipRate, 0.8);
        skipped.set(Feature::AvgCompletionRate, 0.2);

        let a = scorer.analyze(&liked);
        let b = scorer.analyze(&skipped);
        assert!(a.score > b.score);
        assert!(a.confidence > b.confidence);
    }

    #[test]
    fn test_custom_weights_rescaled() {
        let scorer = StatisticalScorer::with_weights([2.0; FEATURE_COUNT]).unwrap();
        let total: f64 = scorer.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(StatisticalScorer::with_weights([0.0; FEATURE_COUNT]).is_err());
    }
}
