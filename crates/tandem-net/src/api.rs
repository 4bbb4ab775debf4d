//! Seams to the external collaborators the engine depends on.
//!
//! The engine only ever talks to these traits; [`crate::rest::RestClient`]
//! and [`crate::push::WsPushChannel`] are the production implementations and
//! tests supply in-memory doubles.

use async_trait::async_trait;
use bytes::Bytes;

use tandem_shared::protocol::{
    ConversationRecord, DirectoryRecord, MatchStatusRecord, MessageRecord, ParticipationRecord,
};
use tandem_shared::{ConversationKey, CorrelationToken, RoomKey, UserId};

use crate::error::ApiError;

/// Auth/session provider.
pub trait SessionProvider: Send + Sync {
    fn current_user_id(&self) -> UserId;

    /// Bearer token attached to every request, if logged in.
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed credentials, for the CLI and tests.
#[derive(Debug, Clone)]
pub struct StaticSession {
    pub user_id: UserId,
    pub token: Option<String>,
}

impl StaticSession {
    pub fn new(user_id: UserId, token: Option<String>) -> Self {
        Self { user_id, token }
    }
}

impl SessionProvider for StaticSession {
    fn current_user_id(&self) -> UserId {
        self.user_id.clone()
    }

    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// A file uploaded with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingAttachment {
    pub name: String,
    pub media_type: String,
    pub data: Bytes,
}

/// Conversation/message REST service.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationRecord>, ApiError>;

    async fn list_messages(
        &self,
        key: &ConversationKey,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRecord>, ApiError>;

    /// Multipart send. The server echoes `client_token` in the returned
    /// record when it supports correlation.
    async fn send_message(
        &self,
        key: &ConversationKey,
        body: &str,
        attachments: Vec<OutgoingAttachment>,
        client_token: CorrelationToken,
    ) -> Result<MessageRecord, ApiError>;

    async fn match_status(&self, peer: &ConversationKey) -> Result<MatchStatusRecord, ApiError>;

    async fn event_participation(
        &self,
        club_id: &str,
        event_id: &str,
    ) -> Result<ParticipationRecord, ApiError>;
}

/// Club/user directory service.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn resolve(&self, key: &ConversationKey) -> Result<DirectoryRecord, ApiError>;
}

/// Events produced by a push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// The channel (re)connected.
    Connected,
    /// A message arrived in `room`.
    Message { room: RoomKey, record: MessageRecord },
    /// The connection was lost.
    Disconnected { reason: String },
}

/// Real-time push channel.
///
/// Events are delivered through the receiver handed out when the channel is
/// built, so the trait only carries the control surface.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn connect(&self) -> Result<(), ApiError>;

    async fn subscribe(&self, room: &RoomKey) -> Result<(), ApiError>;

    async fn unsubscribe(&self, room: &RoomKey) -> Result<(), ApiError>;
}
