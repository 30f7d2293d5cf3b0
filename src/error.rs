//! Application error types.

use std::path::PathBuf;

use thiserror::Error;

/// Application-level errors for the migration.
#[derive(Error, Debug)]
pub enum AppError {
    // Transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Firestore API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid Firestore URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to decode Firestore response: {0}")]
    Decode(String),

    // Credential errors
    #[error("No credentials found. Set GOOGLE_APPLICATION_CREDENTIALS or configure a project id for application default credentials")]
    CredentialsNotFound,

    #[error("Failed to read credentials from {}: {source}", path.display())]
    CredentialFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid credentials in {}: {reason}", path.display())]
    InvalidCredentials { path: PathBuf, reason: String },

    #[error("Token request failed: {0}")]
    Token(String),

    // Migration errors
    #[error("Batch commit of {pending} updates failed: {message}")]
    CommitFailed { pending: usize, message: String },

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the API reported the document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Api { status: 404, .. })
    }
}
