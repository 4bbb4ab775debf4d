use thiserror::Error;

use tandem_shared::{ErrorKind, TandemError};

/// Failures talking to the REST service or the push channel.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection refused, reset, DNS failure and the like.
    #[error("Network error: {0}")]
    Network(String),

    /// The push channel is not connected.
    #[error("Push channel disconnected")]
    Disconnected,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Server-side gating refusal (HTTP 403).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The server rejected the payload (HTTP 400/413/422).
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    Url(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] TandemError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Timeout | ApiError::Network(_) | ApiError::Disconnected => {
                ErrorKind::TransientNetwork
            }
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Forbidden(_) => ErrorKind::GatingDenied,
            ApiError::Rejected(_) => ErrorKind::Validation,
            ApiError::Server { .. }
            | ApiError::Decode(_)
            | ApiError::Url(_)
            | ApiError::Protocol(_) => ErrorKind::Server,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Server {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ApiError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => ApiError::Disconnected,
            WsError::Url(e) => ApiError::Url(e.to_string()),
            WsError::Http(response) => ApiError::Server {
                status: response.status().as_u16(),
                message: "push handshake refused".into(),
            },
            other => ApiError::Network(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ApiError::Timeout.kind(), ErrorKind::TransientNetwork);
        assert_eq!(ApiError::Disconnected.kind(), ErrorKind::TransientNetwork);
        assert_eq!(ApiError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ApiError::Forbidden("no".into()).kind(), ErrorKind::GatingDenied);
        assert_eq!(ApiError::Rejected("big".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            ApiError::Server {
                status: 502,
                message: "bad gateway".into()
            }
            .kind(),
            ErrorKind::Server
        );
    }
}
