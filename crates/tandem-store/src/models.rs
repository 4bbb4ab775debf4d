//! Domain models held in the client-side cache.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tandem_shared::constants::{IMAGE_MEDIA_PREFIX, MAX_ATTACHMENTS};
use tandem_shared::protocol::{AttachmentRecord, ConversationRecord, MessageRecord};
use tandem_shared::{
    classify, ConversationKey, ConversationKind, CorrelationToken, MessageId, SourceHint, UserId,
};

use crate::error::RecordError;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A remote file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentRef {
    pub url: String,
    pub name: Option<String>,
    pub media_type: Option<String>,
    pub size: Option<u64>,
}

impl AttachmentRef {
    pub fn is_image(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|t| t.starts_with(IMAGE_MEDIA_PREFIX))
    }
}

impl TryFrom<AttachmentRecord> for AttachmentRef {
    type Error = RecordError;

    fn try_from(record: AttachmentRecord) -> Result<Self, Self::Error> {
        let url = record
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or(RecordError::MalformedAttachment)?;
        Ok(Self {
            url,
            name: record.name,
            media_type: record.media_type,
            size: record.size,
        })
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_key: ConversationKey,
    pub sender_id: UserId,
    pub body: String,
    /// Ordered, at most [`MAX_ATTACHMENTS`].
    pub attachments: Vec<AttachmentRef>,
    pub created_at: DateTime<Utc>,
    pub source: SourceHint,
}

impl Message {
    /// Validate a wire record into a message for `key`.
    ///
    /// The record's own conversation field, when present, must classify to
    /// the same key. Attachments are all-or-nothing: one bad attachment
    /// rejects the whole record.
    pub fn from_record(
        record: MessageRecord,
        key: &ConversationKey,
        source: SourceHint,
    ) -> Result<Self, RecordError> {
        let id = record.id.ok_or(RecordError::MissingField("id"))?;
        if id.as_str().trim().is_empty() || id.is_local() {
            return Err(RecordError::InvalidId(id.to_string()));
        }

        if let Some(raw) = record.conversation.as_deref() {
            let belongs_to = classify(raw).map_err(|_| RecordError::WrongConversation {
                expected: key.clone(),
                found: raw.to_string(),
            })?;
            if &belongs_to.key != key {
                return Err(RecordError::WrongConversation {
                    expected: key.clone(),
                    found: raw.to_string(),
                });
            }
        }

        let sender_id = record
            .sender_id
            .filter(|s| !s.trim().is_empty())
            .map(UserId)
            .ok_or(RecordError::MissingField("sender_id"))?;

        let raw_ts = record
            .created_at
            .ok_or(RecordError::MissingField("created_at"))?;
        let created_at = parse_timestamp(&raw_ts)?;

        if record.attachments.len() > MAX_ATTACHMENTS {
            return Err(RecordError::TooManyAttachments(record.attachments.len()));
        }
        let attachments = record
            .attachments
            .into_iter()
            .map(AttachmentRef::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let body = record.body.unwrap_or_default();
        if body.is_empty() && attachments.is_empty() {
            return Err(RecordError::EmptyMessage);
        }

        Ok(Self {
            id,
            conversation_key: key.clone(),
            sender_id,
            body,
            attachments,
            created_at,
            source,
        })
    }

    /// Merge ordering key.
    pub fn order_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id.clone())
    }
}

/// Delivery state of a cached message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Delivery {
    /// Acknowledged by the server.
    Persisted,
    /// Optimistically inserted; waiting for the server echo.
    Pending { token: CorrelationToken },
    /// The send failed; kept visible until the user discards it.
    Failed {
        token: CorrelationToken,
        reason: String,
    },
}

/// A message as presented to the UI, with its delivery state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    pub message: Message,
    pub delivery: Delivery,
}

impl StoredMessage {
    pub fn is_persisted(&self) -> bool {
        matches!(self.delivery, Delivery::Persisted)
    }

    pub fn token(&self) -> Option<CorrelationToken> {
        match &self.delivery {
            Delivery::Persisted => None,
            Delivery::Pending { token } | Delivery::Failed { token, .. } => Some(*token),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Display metadata for the peer or club behind a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationMeta {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ConversationMeta {
    /// Placeholder used until the directory lookup resolves.
    pub fn placeholder(key: &ConversationKey) -> Self {
        Self {
            display_name: Some(key.to_string()),
            avatar_url: None,
        }
    }
}

/// A conversation known to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub key: ConversationKey,
    pub kind: ConversationKind,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub meta: ConversationMeta,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = RecordError;

    fn try_from(record: ConversationRecord) -> Result<Self, Self::Error> {
        let raw_key = record.key.ok_or(RecordError::MissingField("key"))?;
        let raw_key = match record.event_id.as_deref() {
            Some(event) if !raw_key.contains([':', '/']) => format!("{raw_key}:{event}"),
            _ => raw_key,
        };
        let route = classify(&raw_key)?;

        let last_message_at = record
            .last_message_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        let unread_count = match record.unread_count {
            None => 0,
            Some(n) => u32::try_from(n).map_err(|_| RecordError::NegativeCount(n))?,
        };

        Ok(Self {
            key: route.key,
            kind: route.kind,
            last_message_text: record.last_message,
            last_message_at,
            unread_count,
            meta: ConversationMeta {
                display_name: record.display_name,
                avatar_url: record.avatar_url,
            },
        })
    }
}

/// A locally synthesized conversation for a key with no server record yet.
///
/// Never mutated: updated metadata produces a new value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VirtualConversation {
    pub key: ConversationKey,
    pub kind: ConversationKind,
    pub meta: ConversationMeta,
}

impl VirtualConversation {
    pub fn new(key: ConversationKey) -> Self {
        Self {
            kind: key.kind(),
            meta: ConversationMeta::placeholder(&key),
            key,
        }
    }

    pub fn with_meta(&self, meta: ConversationMeta) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind,
            meta,
        }
    }
}

/// One row of the aggregated conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum ConversationEntry {
    Persisted(Conversation),
    Virtual(VirtualConversation),
}

impl ConversationEntry {
    pub fn key(&self) -> &ConversationKey {
        match self {
            ConversationEntry::Persisted(c) => &c.key,
            ConversationEntry::Virtual(v) => &v.key,
        }
    }

    pub fn kind(&self) -> ConversationKind {
        match self {
            ConversationEntry::Persisted(c) => c.kind,
            ConversationEntry::Virtual(v) => v.kind,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, ConversationEntry::Virtual(_))
    }

    pub fn unread_count(&self) -> u32 {
        match self {
            ConversationEntry::Persisted(c) => c.unread_count,
            ConversationEntry::Virtual(_) => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RecordError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidTimestamp(raw.to_string()))
}
