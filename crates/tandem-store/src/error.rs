use thiserror::Error;

use tandem_shared::{ConversationKey, IdentityError};

/// Reasons a wire record fails shape validation.
///
/// Merges never fail on these: the record is dropped, logged and counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A required field is absent or empty.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Server ids must be non-empty and outside the local id namespace.
    #[error("Invalid message id: {0:?}")]
    InvalidId(String),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// The record names a different conversation than the one being merged.
    #[error("Record for {found:?} merged into {expected}")]
    WrongConversation {
        expected: ConversationKey,
        found: String,
    },

    #[error("Too many attachments: {0}")]
    TooManyAttachments(usize),

    #[error("Malformed attachment")]
    MalformedAttachment,

    #[error("Message has neither body nor attachments")]
    EmptyMessage,

    #[error("Negative count: {0}")]
    NegativeCount(i64),

    #[error("Invalid conversation key: {0}")]
    Identity(#[from] IdentityError),
}
