//! # Agents Crate
//!
//! Scoring agents for the recommendation ensemble.
//!
//! ## Components
//!
//! ### Math Utilities
//! Cosine similarity, Euclidean distance, normalization, time decay, sigmoid
//! and weighted average, all with explicit precondition checks.
//!
//! ### Vector Store
//! Mutex-guarded map of song vectors with nearest-neighbour queries.
//!
//! ### Statistical Scorer
//! Fixed weighted combination of the 14 song features through a sigmoid.
//!
//! ### Collaborative Scorer
//! Similarity-weighted like-score of the nearest songs the user already knows.
//!
//! ### External Scorer
//! Capability trait for an optional pluggable model, with a no-op default.
//!
//! ## Example Usage
//!
//! ```ignore
//! use agents::{CollaborativeScorer, StatisticalScorer, VectorStore};
//! use std::sync::Arc;
//!
//! let statistical = StatisticalScorer::new();
//! let collaborative = CollaborativeScorer::new(Arc::new(VectorStore::new()));
//!
//! let s = statistical.analyze(&features);
//! let c = collaborative.analyze(&features)?;
//! ```

pub mod collaborative;
pub mod external;
pub mod math;
pub mod statistical;
pub mod types;
pub mod vector_store;

pub use collaborative::{CollaborativeConfig, CollaborativeScorer};
pub use external::{ExternalScorer, NullScorer, ScorerError};
pub use math::MathError;
pub use statistical::{StatisticalScorer, DEFAULT_FEATURE_WEIGHTS};
pub use types::AgentScore;
pub use vector_store::VectorStore;
