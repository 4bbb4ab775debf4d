//! Wire records exchanged with the REST service and the push channel.
//!
//! Records are deliberately lenient: every field is optional so a single
//! malformed entry never fails a whole page. Shape validation happens when a
//! record is merged into the client cache.

use serde::{Deserialize, Serialize};

use crate::error::TandemError;
use crate::types::{MessageId, RoomKey};

/// A message as delivered by `GET /conversations/{key}/messages`, the send
/// endpoint, or a push frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default, alias = "conversation_key", alias = "chat_key")]
    pub conversation: Option<String>,
    #[serde(default, alias = "sender", alias = "from")]
    pub sender_id: Option<String>,
    #[serde(default, alias = "content", alias = "text")]
    pub body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
    /// RFC 3339 timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Echo of the client correlation token, when the server provides one.
    #[serde(default)]
    pub client_token: Option<String>,
}

/// A file reference attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "file_name")]
    pub name: Option<String>,
    #[serde(default, alias = "mime_type", alias = "content_type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// One row of `GET /conversations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default, alias = "login", alias = "chat_key")]
    pub key: Option<String>,
    /// Some payloads carry the event separately from a `club_<id>` key.
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub unread_count: Option<i64>,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "avatar")]
    pub avatar_url: Option<String>,
}

/// `GET /matches/{login}` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatusRecord {
    #[serde(default)]
    pub i_liked: Option<bool>,
    #[serde(default)]
    pub liked_me: Option<bool>,
    #[serde(default)]
    pub is_match: Option<bool>,
}

/// `GET /clubs/{club}/events/{event}/participation` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    #[serde(default)]
    pub status: Option<String>,
}

/// Directory lookup payload for a peer or a club.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "avatar")]
    pub avatar_url: Option<String>,
}

/// Frames received from the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    /// A message arrived in a subscribed room.
    Message { room: RoomKey, message: MessageRecord },
    /// Subscription acknowledged.
    Subscribed { room: RoomKey },
    /// Unsubscription acknowledged.
    Unsubscribed { room: RoomKey },
    /// Server-side error report.
    Error { message: String },
}

impl PushFrame {
    pub fn from_text(text: &str) -> Result<Self, TandemError> {
        let frame: Self = serde_json::from_str(text)?;
        match &frame {
            PushFrame::Message { room, .. }
            | PushFrame::Subscribed { room }
            | PushFrame::Unsubscribed { room }
                if room.as_str().trim().is_empty() =>
            {
                Err(TandemError::Protocol("frame without room".into()))
            }
            _ => Ok(frame),
        }
    }
}

/// Control frames sent to the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PushControl {
    Subscribe { room: RoomKey },
    Unsubscribe { room: RoomKey },
}

impl PushControl {
    pub fn to_text(&self) -> Result<String, TandemError> {
        Ok(serde_json::to_string(self)?)
    }
}
