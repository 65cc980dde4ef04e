//! # Profile Model
//!
//! Trainable listening-profile scorer that plugs into the engine as its
//! [`agents::ExternalScorer`]. Training fits per-feature statistics and a
//! small k-means over the feature vectors of the listening history; scoring
//! compares a song against that profile.
//!
//! ```ignore
//! let model = ProfileModel::open(&model_dir, ProfileConfig::default())?;
//! model.train(&history_features).await?;
//! let score = model.score(&features).await?;
//! ```

pub mod clustering;
pub mod error;
pub mod model;
pub mod profile;

pub use clustering::KMeans;
pub use error::{ModelError, Result};
pub use model::{ModelStatus, ProfileConfig, ProfileModel, MODEL_FILE};
pub use profile::UserProfile;
