//! Error types shared across the Kayley crates.
//!
//! Internal plumbing propagates `anyhow::Error` with context; the public
//! orchestration surface converts into [`KayleyError`] so callers can tell a
//! fatal provider failure apart from everything else.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KayleyError {
    /// The primary provider call failed. This is the only fatal turn error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(String),

    /// A cached read was used to build a write after another writer moved on.
    #[error("Stale write to {entity}: read version {read_version}, current version {current_version}")]
    StaleWrite {
        entity: &'static str,
        read_version: u64,
        current_version: u64,
    },

    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A non-provider HTTP collaborator (calendar, media, speech) failed.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for KayleyError {
    fn from(e: anyhow::Error) -> Self {
        KayleyError::Internal(format!("{:#}", e))
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, KayleyError>;
