use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error classes surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Attachment constraints, empty send. Resolved locally.
    Validation,
    /// Match gating refused, locally or by a server-side 403.
    GatingDenied,
    /// Peer, club or event missing.
    NotFound,
    /// Timeout or disconnect.
    TransientNetwork,
    /// 5xx or an unreadable response.
    Server,
}

impl ErrorKind {
    /// Whether the UI should offer a generic retry affordance.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientNetwork | ErrorKind::Server)
    }
}

#[derive(Error, Debug)]
pub enum TandemError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures while classifying a conversation key or deep-link route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Empty conversation key")]
    Empty,

    #[error("Invalid club id: {0:?}")]
    InvalidClubId(String),

    #[error("Invalid event id: {0:?}")]
    InvalidEventId(String),

    #[error("Invalid peer login: {0:?}")]
    InvalidLogin(String),
}
