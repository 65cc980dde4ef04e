use agents::{MathError, ScorerError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to access model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt model state: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Insufficient training data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error(transparent)]
    Math(#[from] MathError),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl From<ModelError> for ScorerError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InsufficientData { needed, got } => ScorerError::InsufficientData { needed, got },
            ModelError::Math(e) => ScorerError::Math(e),
            other => ScorerError::Failed(other.to_string()),
        }
    }
}
