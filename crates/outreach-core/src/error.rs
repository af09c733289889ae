//! Unified error types for the outreach engine

use thiserror::Error;

/// Unified error type for all outreach operations
#[derive(Error, Debug)]
pub enum OutreachError {
    // Surface errors
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation to {url} timed out after {timeout_secs}s")]
    NavigationTimeout { url: String, timeout_secs: u64 },

    // Session errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Challenge interstitial detected: {0}")]
    Challenge(String),

    // Setup errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    // Ledger errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using OutreachError
pub type Result<T> = std::result::Result<T, OutreachError>;
