use music_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SequenceError {
    /// A tuning parameter is outside its valid range
    #[error("Invalid {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] LibraryError),
}

pub type Result<T> = std::result::Result<T, SequenceError>;

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> SequenceError {
    SequenceError::InvalidConfig {
        name,
        reason: reason.into(),
    }
}
