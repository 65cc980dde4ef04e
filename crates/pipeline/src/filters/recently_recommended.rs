//! Drops songs that recent quick-pick calls already handed out.

use crate::traits::{Filter, FilterContext};
use anyhow::Result;
use music_library::Recommendation;

pub struct RecentlyRecommendedFilter;

impl Filter for RecentlyRecommendedFilter {
    fn name(&self) -> &str {
        "RecentlyRecommendedFilter"
    }

    fn apply(
        &self,
        candidates: Vec<Recommendation>,
        context: &FilterContext,
    ) -> Result<Vec<Recommendation>> {
        Ok(candidates
            .into_iter()
            .filter(|c| !context.recently_recommended.contains(&c.song_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_recent() {
        let mut context = FilterContext::default();
        context.recently_recommended.insert("x".to_string());
        let candidates = vec![
            Recommendation::new("x", 80.0, 10.0, ""),
            Recommendation::new("y", 70.0, 10.0, ""),
        ];
        let kept = RecentlyRecommendedFilter.apply(candidates, &context).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].song_id, "y");
    }
}
