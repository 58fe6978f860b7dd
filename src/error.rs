//! Error types for kinesync

use crate::types::{Channel, PlanId};
use thiserror::Error;

/// Errors surfaced to the caller.
///
/// Everything else degrades gracefully inside the pipeline and is recorded in the
/// plan diagnostics instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid behavior event #{index} on {channel}: {reason}")]
    InvalidBehaviorEvent {
        index: usize,
        channel: Channel,
        reason: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown cultural profile: {0}")]
    UnknownCulturalProfile(String),

    #[error("Unknown plan: {0}")]
    UnknownPlan(PlanId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Plan observer failed: {0}")]
    ObserverFailed(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SyncError>;
