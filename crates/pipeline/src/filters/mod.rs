//! Filter implementations for the ranking pipeline.

pub mod minimum_score;
pub mod recently_recommended;

pub use minimum_score::MinimumScoreFilter;
pub use recently_recommended::RecentlyRecommendedFilter;
