//! Score fusion.
//!
//! A fixed linear blend with one confidence-gated branch:
//! - external score present with confidence above the gate:
//!   20% statistical, 30% collaborative, 50% external
//! - otherwise: 40% statistical, 60% collaborative (external ignored)
//!
//! Fused confidence is the mean confidence of the agents that contributed.

use agents::AgentScore;
use music_library::Recommendation;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// External scores count only when their confidence is strictly above this
    pub external_confidence_gate: f64,
    pub gated_statistical_weight: f64,
    pub gated_collaborative_weight: f64,
    pub gated_external_weight: f64,
    pub statistical_weight: f64,
    pub collaborative_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            external_confidence_gate: 80.0,
            gated_statistical_weight: 0.2,
            gated_collaborative_weight: 0.3,
            gated_external_weight: 0.5,
            statistical_weight: 0.4,
            collaborative_weight: 0.6,
        }
    }
}

/// Which branch of the blend produced a fused score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionBranch {
    WithExternal,
    AgentsOnly,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreFusion {
    config: FusionConfig,
}

impl ScoreFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn branch(&self, external: Option<&AgentScore>) -> FusionBranch {
        match external {
            Some(ext) if ext.confidence > self.config.external_confidence_gate => FusionBranch::WithExternal,
            _ => FusionBranch::AgentsOnly,
        }
    }

    pub fn fuse(
        &self,
        song_id: &str,
        statistical: AgentScore,
        collaborative: AgentScore,
        external: Option<AgentScore>,
    ) -> Recommendation {
        let c = &self.config;
        let (score, confidence, branch) = match (self.branch(external.as_ref()), external) {
            (FusionBranch::WithExternal, Some(ext)) => (
                c.gated_statistical_weight * statistical.score
                    + c.gated_collaborative_weight * collaborative.score
                    + c.gated_external_weight * ext.score,
                (statistical.confidence + collaborative.confidence + ext.confidence) / 3.0,
                FusionBranch::WithExternal,
            ),
            _ => (
                c.statistical_weight * statistical.score + c.collaborative_weight * collaborative.score,
                (statistical.confidence + collaborative.confidence) / 2.0,
                FusionBranch::AgentsOnly,
            ),
        };

        let reason = reason_for(&statistical, &collaborative, external.as_ref(), branch);
        Recommendation::new(song_id, score, confidence, reason)
    }
}

fn reason_for(
    statistical: &AgentScore,
    collaborative: &AgentScore,
    external: Option<&AgentScore>,
    branch: FusionBranch,
) -> String {
    if statistical.confidence == 0.0 && collaborative.confidence == 0.0 {
        return "New to your library".to_string();
    }
    if branch == FusionBranch::WithExternal {
        if let Some(ext) = external {
            if ext.score >= statistical.score.max(collaborative.score) {
                return format!("Fits your listening profile (model confidence {:.0})", ext.confidence);
            }
        }
    }
    if collaborative.confidence > 0.0 && collaborative.score > statistical.score {
        "Similar to songs you like".to_string()
    } else {
        "Matches how you usually listen".to_string()
    }
}
