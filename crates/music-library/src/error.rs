//! Error types for the music-library crate.
//!
//! Every storage backend and loader maps its failures onto [`LibraryError`],
//! so the engine only has to deal with a single storage error type.

use thiserror::Error;

/// Errors that can occur while loading, validating or persisting library data.
#[derive(Error, Debug)]
pub enum LibraryError {
    /// File could not be found or opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading or writing a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document couldn't be decoded
    #[error("Failed to decode {file}: {source}")]
    Decode {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record field had an invalid value
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Referenced song doesn't exist in the catalog
    #[error("Unknown song: {0}")]
    UnknownSong(String),

    /// The SQLite backend reported a failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The storage backend is unavailable (closed, locked, unreachable)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, LibraryError>;
