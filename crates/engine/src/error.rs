use agents::{MathError, ScorerError};
use music_library::LibraryError;
use sequence::SequenceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] LibraryError),

    #[error(transparent)]
    Sequence(SequenceError),

    #[error("Numeric error: {0}")]
    Math(#[from] MathError),

    #[error("Model error: {0}")]
    Scorer(#[from] ScorerError),

    #[error(transparent)]
    Ranking(#[from] anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Recommendation generation was cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

// Storage failures surface as Storage no matter which layer saw them first
impl From<SequenceError> for EngineError {
    fn from(err: SequenceError) -> Self {
        match err {
            SequenceError::Storage(e) => EngineError::Storage(e),
            other => EngineError::Sequence(other),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::TaskFailed(err.to_string())
    }
}
