//! Error types for colloquy-core

use thiserror::Error;

use crate::completion::CompletionError;
use crate::identity::AuthError;

/// Main error type for the colloquy-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Input rejected before it reached any collaborator
    #[error("{0}")]
    Validation(String),

    /// Upload rejected or unreadable
    #[error("{0}")]
    Image(String),

    /// Identity provider error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Completion, vision or image-generation request failed
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Chat not found
    #[error("chat not found: {0}")]
    ChatNotFound(String),

    /// Compare-and-swap kept losing against concurrent writers
    #[error("write conflict on {path} after {attempts} attempts")]
    WriteConflict { path: String, attempts: usize },
}

/// Result type alias for colloquy-core
pub type Result<T> = std::result::Result<T, Error>;
