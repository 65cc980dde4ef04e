use serde::{Deserialize, Serialize};

/// Output of a single scoring agent for one song.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    /// Score in [0, 100]
    pub score: f64,
    /// Confidence in [0, 100]
    pub confidence: f64,
}

impl AgentScore {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score: clamp_percent(score),
            confidence: clamp_percent(confidence),
        }
    }

    /// Neutral answer for songs an agent knows nothing about.
    pub fn neutral() -> Self {
        Self::new(50.0, 0.0)
    }
}

fn clamp_percent(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 100.0) } else { 0.0 }
}
