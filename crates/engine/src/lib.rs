//! # Engine Crate
//!
//! The [`RecommendationManager`] ties the library store, scoring agents,
//! transition graph, skip handler and ranking pipeline into one engine with
//! an explicit lifecycle: [`RecommendationManager::init`] to build it,
//! [`RecommendationManager::shutdown`] to stop its background work.
//!
//! ## Example Usage
//!
//! ```ignore
//! use engine::{EngineConfig, RecommendationManager};
//!
//! let manager = RecommendationManager::init(store, EngineConfig::default(), None).await?;
//! let maintenance = manager.spawn_maintenance();
//!
//! for rec in manager.generate_recommendations(10).await? {
//!     println!("{} {:.1} ({})", rec.song_id, rec.score, rec.reason);
//! }
//!
//! manager.shutdown();
//! maintenance.await?;
//! ```

pub mod config;
pub mod error;
pub mod import;
pub mod manager;
pub mod types;

pub use config::{EngineConfig, MaintenanceConfig, ScoringConfig};
pub use error::{EngineError, Result};
pub use manager::RecommendationManager;
pub use types::{Explanation, ImportReport, MaintenanceSummary, PlayEvent, TrainingReport};
