//! # Sequence Crate
//!
//! Learned listening order and skip behaviour.
//!
//! ## Components
//!
//! ### Transition Engine
//! Weighted directed graph of song-to-song transitions:
//! - Online reinforcement on completed transitions, multiplicative penalty on skips
//! - Exponential time decay from each edge's decay anchor
//! - Epsilon-greedy next-song selection
//! - Hub songs, magnetic pairs, idempotent maintenance (decay + prune)
//!
//! ### Skip Handler
//! Classifies skips into EARLY / MID / LATE bands, converts them into a
//! penalty, updates the transition graph and preference records, and runs a
//! sliding-window detector for FRUSTRATED / SEARCHING / INTERRUPTED patterns.
//! Patterns are published on a broadcast channel.
//!
//! ## Example Usage
//!
//! ```ignore
//! use sequence::{TransitionConfig, TransitionEngine};
//!
//! let engine = TransitionEngine::new(TransitionConfig::default());
//! engine.record_transition("a", "b", 1.0, false);
//! let next = engine.next_song_candidates("a", &[], 5);
//! ```

pub mod error;
pub mod patterns;
pub mod skip;
pub mod transition;

pub use error::{Result, SequenceError};
pub use patterns::{PatternDetector, PatternNotice, RecentSkip, SkipPattern};
pub use skip::{
    classify_skip, skip_penalty, SkipConfig, SkipEvent, SkipHandler, SkipOutcome, SkipType, MAX_WINDOW_SECS,
};
pub use transition::{MagneticPair, MaintenanceReport, TransitionConfig, TransitionEngine};
