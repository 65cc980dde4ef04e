//! Feature extraction, score fusion and final ranking.
//!
//! This crate provides:
//! - FeatureExtractor turning a library snapshot into per-song feature vectors
//! - ScoreFusion blending agent scores into one recommendation
//! - RecommendationAgent producing quick picks through a FilterPipeline
//!
//! ## Architecture
//! A scoring pass runs in stages:
//! 1. FeatureExtractor builds one vector per catalog song
//! 2. Agents score each vector (see the `agents` crate)
//! 3. ScoreFusion combines the agent scores
//! 4. RecommendationAgent filters, diversifies and cuts the ranked list
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{FeatureExtractor, RecommendationAgent, ScoreFusion};
//!
//! let features = FeatureExtractor::default().extract_all(&index, now);
//! let fused: Vec<_> = features
//!     .iter()
//!     .map(|f| fusion.fuse(&f.song_id, statistical.analyze(f), collaborative.analyze(f)?, None))
//!     .collect();
//! let picks = agent.generate_quick_picks(fused, 10)?;
//! ```

pub mod features;
pub mod filter_pipeline;
pub mod filters;
pub mod fusion;
pub mod quick_picks;
pub mod traits;

// Re-export main types
pub use features::{FeatureConfig, FeatureExtractor};
pub use filter_pipeline::FilterPipeline;
pub use fusion::{FusionBranch, FusionConfig, ScoreFusion};
pub use quick_picks::{QuickPickConfig, RecommendationAgent};
pub use traits::{Filter, FilterContext};
