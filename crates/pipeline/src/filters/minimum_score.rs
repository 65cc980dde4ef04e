//! Drops candidates scoring below a floor.

use crate::traits::{Filter, FilterContext};
use anyhow::Result;
use music_library::Recommendation;

pub struct MinimumScoreFilter {
    min_score: f64,
}

impl MinimumScoreFilter {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }
}

impl Filter for MinimumScoreFilter {
    fn name(&self) -> &str {
        "MinimumScoreFilter"
    }

    fn apply(
        &self,
        candidates: Vec<Recommendation>,
        _context: &FilterContext,
    ) -> Result<Vec<Recommendation>> {
        Ok(candidates
            .into_iter()
            .filter(|c| c.score >= self.min_score)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_boundary() {
        let candidates = vec![
            Recommendation::new("a", 30.0, 0.0, ""),
            Recommendation::new("b", 29.9, 0.0, ""),
        ];
        let kept = MinimumScoreFilter::new(30.0)
            .apply(candidates, &FilterContext::default())
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].song_id, "a");
    }
}
