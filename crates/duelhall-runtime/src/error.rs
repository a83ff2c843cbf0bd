//! Error types for the duel runtime.

use duelhall_core::DuelError;
use thiserror::Error;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("arena provisioning failed: {0}")]
    Provision(String),

    #[error("snapshot capture failed: {0}")]
    Snapshot(String),

    #[error("participant staging failed: {0}")]
    Staging(String),

    #[error("snapshot restore failed: {0}")]
    Restore(String),

    #[error("arena teardown failed: {0}")]
    Teardown(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Duel(#[from] DuelError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("unknown arena template: {0}")]
    UnknownTemplate(String),
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("step {index} at {at_ms}ms runs before the previous step")]
    OutOfOrder { index: usize, at_ms: u64 },

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
