//! Core traits for the ranking pipeline.
//!
//! Filters are composable steps applied to scored recommendations before
//! the final quick-pick ranking.

use anyhow::Result;
use music_library::{Recommendation, SongId};
use std::collections::HashSet;

/// What a filter may look at besides the candidates themselves.
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    /// Songs handed out by recent quick-pick calls
    pub recently_recommended: HashSet<SongId>,
}

/// Core trait for filtering scored songs.
///
/// `Send + Sync` so a pipeline can live inside shared engine state.
/// Filters take ownership of the candidates and return the survivors.
pub trait Filter: Send + Sync {
    /// Returns the name of this filter (for logging)
    fn name(&self) -> &str;

    fn apply(
        &self,
        candidates: Vec<Recommendation>,
        context: &FilterContext,
    ) -> Result<Vec<Recommendation>>;
}
