use thiserror::Error;

use tandem_net::ApiError;
use tandem_shared::{ErrorKind, IdentityError};

use crate::staging::AttachmentRejection;

/// A send refused before it reached the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message has neither text nor attachments")]
    EmptyMessage,

    #[error("No conversation selected")]
    NoTarget,

    #[error(transparent)]
    Attachment(#[from] AttachmentRejection),

    /// The server refused the payload (size, type, content).
    #[error("Rejected by server: {0}")]
    Rejected(String),
}

/// Failure of `EngineHandle::send`. Sends are never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// Carries the gating reason verbatim.
    #[error("{reason}")]
    GatingDenied { reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Sync engine is not running")]
    EngineClosed,
}

impl SendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SendError::Validation(_) => ErrorKind::Validation,
            SendError::GatingDenied { .. } => ErrorKind::GatingDenied,
            SendError::NotFound(_) => ErrorKind::NotFound,
            SendError::TransientNetwork(_) | SendError::EngineClosed => {
                ErrorKind::TransientNetwork
            }
            SendError::Server(_) => ErrorKind::Server,
        }
    }
}

impl From<ApiError> for SendError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Forbidden(reason) => SendError::GatingDenied { reason },
            ApiError::Rejected(message) => ValidationError::Rejected(message).into(),
            ApiError::NotFound(what) => SendError::NotFound(what),
            other => match other.kind() {
                ErrorKind::TransientNetwork => SendError::TransientNetwork(other.to_string()),
                _ => SendError::Server(other.to_string()),
            },
        }
    }
}

/// Failures of the non-send engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid conversation: {0}")]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Sync engine is not running")]
    Closed,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Identity(_) => ErrorKind::Validation,
            EngineError::Api(e) => e.kind(),
            EngineError::Closed => ErrorKind::TransientNetwork,
        }
    }
}
