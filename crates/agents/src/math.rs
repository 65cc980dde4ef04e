//! Shared numeric primitives.
//!
//! Every function here is pure. Comparison functions reject vectors of
//! different lengths, empty input and non-finite values with a [`MathError`]
//! instead of producing NaN further down the scoring path.

use music_library::{Timestamp, MILLIS_PER_DAY};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("Empty input")]
    Empty,

    #[error("Non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("Half-life must be positive, got {0}")]
    InvalidHalfLife(f64),
}

pub type Result<T> = std::result::Result<T, MathError>;

fn check_finite(v: &[f64]) -> Result<()> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(MathError::NonFinite { index }),
        None => Ok(()),
    }
}

fn check_pair(a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        return Err(MathError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(MathError::Empty);
    }
    check_finite(a)?;
    check_finite(b)
}

pub fn dot(a: &[f64], b: &[f64]) -> Result<f64> {
    check_pair(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cosine similarity in [-1, 1]; 0 when either vector is all zeros.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    check_pair(a, b)?;
    let (mut ab, mut aa, mut bb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        ab += x * y;
        aa += x * x;
        bb += y * y;
    }
    if aa == 0.0 || bb == 0.0 {
        return Ok(0.0);
    }
    Ok((ab / (aa.sqrt() * bb.sqrt())).clamp(-1.0, 1.0))
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    check_pair(a, b)?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt())
}

/// Min-max rescale to [0, 1]. A constant vector maps to all 0.5.
pub fn normalize(v: &[f64]) -> Result<Vec<f64>> {
    if v.is_empty() {
        return Err(MathError::Empty);
    }
    check_finite(v)?;
    let min = v.iter().copied().fold(f64::INFINITY, f64::min);
    let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range == 0.0 {
        return Ok(vec![0.5; v.len()]);
    }
    Ok(v.iter().map(|x| (x - min) / range).collect())
}

/// `exp(-ln2 * elapsed / half_life)` in (0, 1]. Events in the future count as now.
pub fn time_decay(event: Timestamp, now: Timestamp, half_life_days: f64) -> Result<f64> {
    if !half_life_days.is_finite() || half_life_days <= 0.0 {
        return Err(MathError::InvalidHalfLife(half_life_days));
    }
    let elapsed_days = (now - event).max(0) as f64 / MILLIS_PER_DAY as f64;
    Ok(decay_for_days(elapsed_days, half_life_days))
}

/// Decay factor for a known elapsed time. Callers validate the half-life once up front.
pub fn decay_for_days(elapsed_days: f64, half_life_days: f64) -> f64 {
    if elapsed_days <= 0.0 || half_life_days <= 0.0 {
        return 1.0;
    }
    (-std::f64::consts::LN_2 * elapsed_days / half_life_days).exp()
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Weighted mean; 0 when the weights sum to 0.
pub fn weighted_average(values: &[f64], weights: &[f64]) -> Result<f64> {
    if values.len() != weights.len() {
        return Err(MathError::LengthMismatch {
            left: values.len(),
            right: weights.len(),
        });
    }
    check_finite(values)?;
    check_finite(weights)?;
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return Ok(0.0);
    }
    Ok(values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_cosine_self_and_symmetry() {
        let a = [0.3, 0.9, 0.1, 0.5];
        let b = [0.7, 0.2, 0.4, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < EPS);
        assert!(
            (cosine_similarity(&a, &b).unwrap() - cosine_similarity(&b, &a).unwrap()).abs() < EPS
        );
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            cosine_similarity(&[1.0], &[1.0, 2.0]),
            Err(MathError::LengthMismatch { left: 1, right: 2 })
        );
        assert!(euclidean_distance(&[1.0, 2.0, 3.0], &[1.0]).is_err());
        assert!(weighted_average(&[1.0], &[]).is_err());
    }

    #[test]
    fn test_rejects_nan_and_empty() {
        assert_eq!(
            cosine_similarity(&[1.0, f64::NAN], &[1.0, 1.0]),
            Err(MathError::NonFinite { index: 1 })
        );
        assert_eq!(cosine_similarity(&[], &[]), Err(MathError::Empty));
        assert_eq!(normalize(&[]), Err(MathError::Empty));
    }

    #[test]
    fn test_euclidean() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap() - 5.0).abs() < EPS);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(&[2.0, 4.0, 6.0]).unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(normalize(&[3.0, 3.0]).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_time_decay() {
        let half_life = 23.0;
        let now = 100 * MILLIS_PER_DAY;
        assert_eq!(time_decay(now, now, half_life).unwrap(), 1.0);
        let one_half_life = time_decay(now - 23 * MILLIS_PER_DAY, now, half_life).unwrap();
        assert!((one_half_life - 0.5).abs() < EPS);
        // monotone in elapsed time
        let older = time_decay(now - 40 * MILLIS_PER_DAY, now, half_life).unwrap();
        assert!(older < one_half_life && older > 0.0);
        assert!(time_decay(0, now, 0.0).is_err());
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < EPS);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_weighted_average() {
        assert!((weighted_average(&[1.0, 3.0], &[1.0, 1.0]).unwrap() - 2.0).abs() < EPS);
        assert_eq!(weighted_average(&[1.0, 3.0], &[0.0, 0.0]).unwrap(), 0.0);
    }
}
