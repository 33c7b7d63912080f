use thiserror::Error;

/// Main error type for MindOrbit
#[derive(Error, Debug)]
pub enum MindOrbitError {
    /// SQLite store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Language model request or response errors
    #[error("Model error: {0}")]
    Model(String),

    /// API key for a model provider is not available
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Knowledge item not found
    #[error("Knowledge item not found: {0}")]
    ItemNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Layout simulation task errors
    #[error("Layout error: {0}")]
    Layout(String),
}

/// Convenient Result type using MindOrbitError
pub type Result<T> = std::result::Result<T, MindOrbitError>;
