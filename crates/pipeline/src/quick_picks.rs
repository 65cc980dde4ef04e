//! Recommendation Agent: final ranking of fused scores into quick picks.
//!
//! 1. Drop songs handed out by recent calls (bounded history, oldest evicted)
//! 2. Diversity boost: inside each coarse score bucket, lower-ranked songs get
//!    a slightly larger multiplier, growing with rank as `1 - exp(-decay * rank)`
//! 3. Sort by boosted score, take the top `count`
//! 4. Prepend the picks to the history

use crate::filter_pipeline::FilterPipeline;
use crate::filters::{MinimumScoreFilter, RecentlyRecommendedFilter};
use crate::traits::FilterContext;
use anyhow::Result;
use music_library::{Recommendation, RingBuffer, SongId};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuickPickConfig {
    pub history_capacity: usize,
    pub bucket_width: f64,
    pub diversity_boost: f64,
    pub rank_decay: f64,
    /// Fused scores below this never become quick picks
    pub min_score: f64,
}

impl Default for QuickPickConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
            bucket_width: 10.0,
            diversity_boost: 0.05,
            rank_decay: 0.5,
            min_score: 0.0,
        }
    }
}

pub struct RecommendationAgent {
    config: QuickPickConfig,
    history: RingBuffer<SongId>,
    pipeline: FilterPipeline,
}

impl RecommendationAgent {
    pub fn new(config: QuickPickConfig) -> Self {
        let mut pipeline = FilterPipeline::new().add_filter(RecentlyRecommendedFilter);
        if config.min_score > 0.0 {
            pipeline = pipeline.add_filter(MinimumScoreFilter::new(config.min_score));
        }
        Self {
            history: RingBuffer::with_capacity(config.history_capacity),
            config,
            pipeline,
        }
    }

    pub fn config(&self) -> &QuickPickConfig {
        &self.config
    }

    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub fn generate_quick_picks(
        &mut self,
        candidates: Vec<Recommendation>,
        count: usize,
    ) -> Result<Vec<Recommendation>> {
        let context = FilterContext {
            recently_recommended: self.history.iter_newest().cloned().collect(),
        };
        let mut kept = self.pipeline.apply(candidates, &context)?;
        kept.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.song_id.cmp(&b.song_id))
        });

        let mut boosted: Vec<(f64, Recommendation)> = self.apply_diversity_boost(kept);
        boosted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        boosted.truncate(count);

        let picks: Vec<Recommendation> = boosted
            .into_iter()
            .map(|(score, rec)| Recommendation { score, ..rec })
            .collect();

        for pick in picks.iter().rev() {
            self.history.push(pick.song_id.clone());
        }
        debug!("Generated {} quick picks", picks.len());
        Ok(picks)
    }

    /// Expects `ranked` sorted by descending score.
    fn apply_diversity_boost(&self, ranked: Vec<Recommendation>) -> Vec<(f64, Recommendation)> {
        let width = self.config.bucket_width.max(f64::EPSILON);
        let mut ranks: HashMap<i64, u32> = HashMap::new();
        ranked
            .into_iter()
            .map(|rec| {
                let bucket = (rec.score / width).floor() as i64;
                let rank = ranks.entry(bucket).or_insert(0);
                let factor = 1.0
                    + self.config.diversity_boost
                        * (1.0 - (-self.config.rank_decay * *rank as f64).exp());
                *rank += 1;
                ((rec.score * factor).min(100.0), rec)
            })
            .collect()
    }

    /// Recently recommended ids, newest first.
    pub fn recent_history(&self) -> Vec<SongId> {
        self.history.iter_newest().cloned().collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

impl Default for RecommendationAgent {
    fn default() -> Self {
        Self::new(QuickPickConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, score: f64) -> Recommendation {
        Recommendation::new(id, score, 50.0, "")
    }

    #[test]
    fn test_top_count_and_history() {
        let mut agent = RecommendationAgent::default();
        let picks = agent
            .generate_quick_picks(vec![rec("a", 90.0), rec("b", 70.0), rec("c", 50.0)], 2)
            .unwrap();
        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0].song_id, "a");
        assert_eq!(picks[1].song_id, "b");
        assert_eq!(agent.recent_history(), vec!["a", "b"]);
    }

    #[test]
    fn test_recent_picks_are_filtered() {
        let mut agent = RecommendationAgent::default();
        let candidates = vec![rec("a", 90.0), rec("b", 70.0), rec("c", 50.0)];
        agent.generate_quick_picks(candidates.clone(), 1).unwrap();
        let second = agent.generate_quick_picks(candidates, 3).unwrap();
        let ids: Vec<_> = second.iter().map(|r| r.song_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(agent.recent_history(), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut agent = RecommendationAgent::new(QuickPickConfig {
            history_capacity: 2,
            ..QuickPickConfig::default()
        });
        agent.generate_quick_picks(vec![rec("a", 90.0)], 1).unwrap();
        agent.generate_quick_picks(vec![rec("b", 90.0)], 1).unwrap();
        agent.generate_quick_picks(vec![rec("c", 90.0)], 1).unwrap();
        assert_eq!(agent.recent_history(), vec!["c", "b"]);

        // "a" was evicted, so it is eligible again
        let picks = agent.generate_quick_picks(vec![rec("a", 90.0)], 1).unwrap();
        assert_eq!(picks.len(), 1);
    }

    #[test]
    fn test_boost_lifts_lower_ranks_within_bucket() {
        let mut agent = RecommendationAgent::default();
        let picks = agent
            .generate_quick_picks(vec![rec("a", 85.0), rec("b", 84.5), rec("c", 40.0)], 3)
            .unwrap();
        // leader of each bucket is untouched
        let a = picks.iter().find(|r| r.song_id == "a").unwrap();
        assert_eq!(a.score, 85.0);
        // a near-tie runner-up can overtake its bucket leader
        assert_eq!(picks[0].song_id, "b");
        assert!(picks[0].score > 85.0);
        let c = picks.iter().find(|r| r.song_id == "c").unwrap();
        assert_eq!(c.score, 40.0);
    }

    #[test]
    fn test_boost_is_capped() {
        let mut agent = RecommendationAgent::default();
        let picks = agent
            .generate_quick_picks(vec![rec("a", 100.0), rec("b", 99.0)], 2)
            .unwrap();
        assert!(picks.iter().all(|r| r.score <= 100.0));
    }

    #[test]
    fn test_clear_history() {
        let mut agent = RecommendationAgent::default();
        agent.generate_quick_picks(vec![rec("a", 90.0)], 1).unwrap();
        agent.clear_history();
        assert!(agent.recent_history().is_empty());
        assert_eq!(agent.generate_quick_picks(vec![rec("a", 90.0)], 1).unwrap().len(), 1);
    }
}
