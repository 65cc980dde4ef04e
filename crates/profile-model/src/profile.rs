//! Listening profile: per-feature mean and spread of the history vectors.

use crate::error::{ModelError, Result};
use agents::math;
use agents::DEFAULT_FEATURE_WEIGHTS;
use music_library::{Feature, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub mean: Vec<f64>,
    /// Population standard deviation, 1.0 where a feature never varies
    pub std_dev: Vec<f64>,
}

impl UserProfile {
    pub fn fit(samples: &[Vec<f64>]) -> Result<Self> {
        let first = samples.first().ok_or(ModelError::Math(math::MathError::Empty))?;
        let dims = first.len();
        let n = samples.len() as f64;

        let mut mean = vec![0.0; dims];
        for sample in samples {
            if sample.len() != dims {
                return Err(math::MathError::LengthMismatch {
                    left: dims,
                    right: sample.len(),
                }
                .into());
            }
            for (m, v) in mean.iter_mut().zip(sample) {
                *m += v / n;
            }
        }

        let std_dev = (0..dims)
            .map(|i| {
                let variance = samples.iter().map(|s| (s[i] - mean[i]).powi(2)).sum::<f64>() / n;
                if variance > 0.0 { variance.sqrt() } else { 1.0 }
            })
            .collect();

        Ok(Self { mean, std_dev })
    }

    /// Profile fit in [0, 1] before any diversity adjustment.
    pub fn score(&self, features: &[f64], profile_weight: f64, skip_penalty: f64) -> Result<f64> {
        if features.len() != self.mean.len() {
            return Err(math::MathError::LengthMismatch {
                left: features.len(),
                right: self.mean.len(),
            }
            .into());
        }

        let weights = feature_weights(features.len());
        let mut weighted = 0.0;
        for (i, value) in features.iter().enumerate() {
            let z = ((value - self.mean[i]) / self.std_dev[i]).abs();
            weighted += weights[i] / (1.0 + z);
        }

        let cos = math::cosine_similarity(features, &self.mean)?.max(0.0);
        let mut score = weighted * profile_weight + cos * (1.0 - profile_weight);

        if let Some(skip_rate) = features.get(Feature::SkipRate.index()) {
            score *= 1.0 - skip_rate * skip_penalty;
        }
        Ok(score.clamp(0.0, 1.0))
    }
}

/// Statistical weights, truncated or evenly padded to `dims`.
fn feature_weights(dims: usize) -> Vec<f64> {
    let mut weights: Vec<f64> = DEFAULT_FEATURE_WEIGHTS.iter().copied().take(dims).collect();
    if dims > FEATURE_COUNT {
        let remaining = (1.0 - DEFAULT_FEATURE_WEIGHTS.iter().sum::<f64>()).max(0.0);
        let extra = dims - FEATURE_COUNT;
        weights.extend(std::iter::repeat_n(remaining / extra as f64, extra));
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_mean_and_constant_feature() {
        let profile = UserProfile::fit(&[vec![1.0, 0.5], vec![3.0, 0.5]]).unwrap();
        assert_eq!(profile.mean, vec![2.0, 0.5]);
        assert_eq!(profile.std_dev, vec![1.0, 1.0]);
    }

    #[test]
    fn test_fit_rejects_ragged_and_empty() {
        assert!(UserProfile::fit(&[]).is_err());
        assert!(UserProfile::fit(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_profile_match_beats_outlier() {
        let samples: Vec<Vec<f64>> = (0..6)
            .map(|i| {
                let mut v = vec![0.6; FEATURE_COUNT];
                v[0] = 0.5 + i as f64 * 0.02;
                v[Feature::SkipRate.index()] = 0.0;
                v
            })
            .collect();
        let profile = UserProfile::fit(&samples).unwrap();

        let typical = profile.score(&samples[2], 0.7, 0.5).unwrap();
        let mut outlier = vec![0.0; FEATURE_COUNT];
        outlier[Feature::SkipRate.index()] = 1.0;
        let odd = profile.score(&outlier, 0.7, 0.5).unwrap();
        assert!(typical > odd);
        assert!((0.0..=1.0).contains(&typical));
    }

    #[test]
    fn test_skip_rate_halves_at_most() {
        let samples = vec![vec![0.5; FEATURE_COUNT]; 5];
        let profile = UserProfile::fit(&samples).unwrap();
        let mut skipped = vec![0.5; FEATURE_COUNT];
        skipped[Feature::SkipRate.index()] = 1.0;
        let mut clean = skipped.clone();
        clean[Feature::SkipRate.index()] = 0.5;
        let a = profile.score(&skipped, 0.7, 0.5).unwrap();
        let b = profile.score(&clean, 0.7, 0.5).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_weights_padding() {
        assert_eq!(feature_weights(3).len(), 3);
        let padded = feature_weights(FEATURE_COUNT + 2);
        assert_eq!(padded.len(), FEATURE_COUNT + 2);
        assert!(padded.iter().all(|w| *w >= 0.0));
    }
}
