//! UI-facing handle to the running engine.

use tokio::sync::{mpsc, oneshot, watch};

use tandem_shared::{ConversationKey, ConversationRoute, CorrelationToken, MatchState};
use tandem_store::{ConversationEntry, Message, StoredMessage};

use crate::engine::{EngineCommand, SendFailure};
use crate::error::{EngineError, SendError};
use crate::events::SyncStatus;
use crate::staging::AttachmentCandidate;

/// Cheap to clone; every clone talks to the same engine task.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    conversations: watch::Receiver<Vec<ConversationEntry>>,
    status: watch::Receiver<SyncStatus>,
}

impl EngineHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<EngineCommand>,
        conversations: watch::Receiver<Vec<ConversationEntry>>,
        status: watch::Receiver<SyncStatus>,
    ) -> Self {
        Self {
            commands,
            conversations,
            status,
        }
    }

    /// Aggregated conversation list: persisted entries plus at most one
    /// virtual entry.
    pub fn conversation_list(&self) -> watch::Receiver<Vec<ConversationEntry>> {
        self.conversations.clone()
    }

    /// Poll error and push health.
    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Ordered timeline of `key`. A new subscription starts from the current
    /// state and then follows live updates.
    pub async fn messages(
        &self,
        key: &ConversationKey,
    ) -> Result<watch::Receiver<Vec<StoredMessage>>, EngineError> {
        let key = key.clone();
        self.request(|reply| EngineCommand::WatchMessages { key, reply })
            .await
    }

    /// Gating verdict for `key`, recomputed when facts or history change.
    pub async fn match_state(
        &self,
        key: &ConversationKey,
    ) -> Result<watch::Receiver<MatchState>, EngineError> {
        let key = key.clone();
        self.request(|reply| EngineCommand::WatchMatchState { key, reply })
            .await
    }

    /// Send a message with the given staged attachments.
    ///
    /// The message shows up optimistically at once unless it is refused
    /// locally. The attachments, and their previews, are released when the
    /// send resolves either way. Use [`ComposeSession::send`] to keep them
    /// staged on failure.
    ///
    /// [`ComposeSession::send`]: crate::ComposeSession::send
    pub async fn send(
        &self,
        key: &ConversationKey,
        body: impl Into<String>,
        attachments: Vec<AttachmentCandidate>,
    ) -> Result<Message, SendError> {
        self.send_returning(key, body.into(), attachments)
            .await
            .map_err(|failure| failure.error)
    }

    /// Like [`send`](Self::send), but a failed send hands its attachments
    /// back.
    pub(crate) async fn send_returning(
        &self,
        key: &ConversationKey,
        body: String,
        attachments: Vec<AttachmentCandidate>,
    ) -> Result<Message, SendFailure> {
        let key = key.clone();
        self.request(|reply| EngineCommand::Send {
            key,
            body,
            attachments,
            reply,
        })
        .await
        .map_err(|_| SendFailure {
            error: SendError::EngineClosed,
            returned: Vec::new(),
        })?
    }

    /// Open a conversation from a key or deep-link route.
    ///
    /// An unknown key shows up as a virtual conversation until the server
    /// lists it.
    pub async fn select_conversation(&self, route: &str) -> Result<ConversationRoute, EngineError> {
        let route = route.to_string();
        self.request(|reply| EngineCommand::SelectConversation { route, reply })
            .await?
    }

    /// Fetch the page of history just before what is cached.
    ///
    /// Returns how many messages were new.
    pub async fn load_older(&self, key: &ConversationKey) -> Result<usize, EngineError> {
        let key = key.clone();
        self.request(|reply| EngineCommand::LoadOlder { key, reply })
            .await?
    }

    /// Drop a failed optimistic message. Returns `false` if it was not failed.
    pub async fn discard_failed(
        &self,
        key: &ConversationKey,
        token: CorrelationToken,
    ) -> Result<bool, EngineError> {
        let key = key.clone();
        self.request(|reply| EngineCommand::DiscardFailed { key, token, reply })
            .await
    }

    /// Re-fetch match or participation facts for `key`.
    pub async fn refresh_match_state(&self, key: &ConversationKey) -> Result<(), EngineError> {
        self.command(EngineCommand::RefreshMatchState(key.clone()))
            .await
    }

    pub async fn dismiss_poll_error(&self) -> Result<(), EngineError> {
        self.command(EngineCommand::DismissPollError).await
    }

    /// Stop the engine. In-flight network tasks finish on their own.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown).await;
    }

    async fn command(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.command(make(reply)).await?;
        response.await.map_err(|_| EngineError::Closed)
    }
}
