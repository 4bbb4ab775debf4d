//! The sync engine loop.
//!
//! One tokio task owns the message store, the conversation list, the gating
//! facts and the scheduler. Everything reaches it as a message: commands from
//! [`EngineHandle`], results from the network tasks it spawns, and push
//! events. Views go out through `watch` channels.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use tandem_net::{ApiError, ChatApi, Directory, PushChannel, PushEvent, SessionProvider};
use tandem_shared::constants::MAX_ATTACHMENTS;
use tandem_shared::protocol::{ConversationRecord, DirectoryRecord, MessageRecord};
use tandem_shared::{
    classify, evaluate, ConversationKey, ConversationKind, ConversationRoute, CorrelationToken,
    MatchFacts, MatchState, RoomKey, SourceHint,
};
use tandem_store::{
    ConversationEntry, ConversationListAggregator, ConversationMeta, Message, MessageStore,
    StoredMessage,
};

use crate::config::SyncConfig;
use crate::error::{EngineError, SendError, ValidationError};
use crate::events::{PushHealth, SyncStatus};
use crate::handle::EngineHandle;
use crate::scheduler::{PollTarget, SyncScheduler};
use crate::staging::{AttachmentCandidate, AttachmentRejection};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const INTERNAL_CHANNEL_CAPACITY: usize = 256;

/// External collaborators the engine runs against.
pub struct EngineServices {
    pub api: Arc<dyn ChatApi>,
    pub directory: Arc<dyn Directory>,
    pub push: Arc<dyn PushChannel>,
    /// Receiver paired with `push`.
    pub push_events: mpsc::Receiver<PushEvent>,
    pub session: Arc<dyn SessionProvider>,
}

// ---------------------------------------------------------------------------
// Command / internal event types
// ---------------------------------------------------------------------------

/// A send that did not go through, with its attachments handed back.
pub(crate) struct SendFailure {
    pub error: SendError,
    pub returned: Vec<AttachmentCandidate>,
}

type SendReply = oneshot::Sender<Result<Message, SendFailure>>;

/// Commands sent *into* the engine task by [`EngineHandle`].
pub(crate) enum EngineCommand {
    SelectConversation {
        route: String,
        reply: oneshot::Sender<Result<ConversationRoute, EngineError>>,
    },
    Send {
        key: ConversationKey,
        body: String,
        attachments: Vec<AttachmentCandidate>,
        reply: SendReply,
    },
    WatchMessages {
        key: ConversationKey,
        reply: oneshot::Sender<watch::Receiver<Vec<StoredMessage>>>,
    },
    WatchMatchState {
        key: ConversationKey,
        reply: oneshot::Sender<watch::Receiver<MatchState>>,
    },
    LoadOlder {
        key: ConversationKey,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    DiscardFailed {
        key: ConversationKey,
        token: CorrelationToken,
        reply: oneshot::Sender<bool>,
    },
    RefreshMatchState(ConversationKey),
    DismissPollError,
    Shutdown,
}

/// Results reported back by tasks the engine spawned.
enum Internal {
    ConversationsPolled(Result<Vec<ConversationRecord>, ApiError>),
    MessagesPolled {
        key: ConversationKey,
        result: Result<Vec<MessageRecord>, ApiError>,
    },
    OlderLoaded {
        key: ConversationKey,
        result: Result<Vec<MessageRecord>, ApiError>,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    FactsLoaded {
        key: ConversationKey,
        result: Result<MatchFacts, ApiError>,
    },
    MetaResolved {
        key: ConversationKey,
        result: Result<DirectoryRecord, ApiError>,
    },
    SendFinished {
        key: ConversationKey,
        token: CorrelationToken,
        result: Result<MessageRecord, ApiError>,
        reply: SendReply,
        /// Released on success, handed back on failure.
        attachments: Vec<AttachmentCandidate>,
    },
    PushConnectFinished(Result<(), ApiError>),
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Spawn the engine in a background tokio task and return its handle.
///
/// The push channel is connected from inside the loop; the first
/// conversation poll fires immediately.
pub fn spawn_engine(config: SyncConfig, services: EngineServices) -> EngineHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
    let (list_tx, list_rx) = watch::channel(Vec::new());
    let (status_tx, status_rx) = watch::channel(SyncStatus::default());

    let scheduler = SyncScheduler::new(
        config.push_reconnect_attempts,
        config.push_reconnect_base_delay,
    );

    let engine = Engine {
        config,
        api: services.api,
        directory: services.directory,
        push: services.push,
        session: services.session,
        store: MessageStore::new(),
        conversations: ConversationListAggregator::new(),
        scheduler,
        facts: HashMap::new(),
        message_views: HashMap::new(),
        match_views: HashMap::new(),
        list_tx,
        status_tx,
        internal_tx,
    };

    tokio::spawn(engine.run(command_rx, internal_rx, services.push_events));

    EngineHandle::new(command_tx, list_rx, status_rx)
}

struct Engine {
    config: SyncConfig,
    api: Arc<dyn ChatApi>,
    directory: Arc<dyn Directory>,
    push: Arc<dyn PushChannel>,
    session: Arc<dyn SessionProvider>,

    store: MessageStore,
    conversations: ConversationListAggregator,
    scheduler: SyncScheduler,
    facts: HashMap<ConversationKey, MatchFacts>,

    message_views: HashMap<ConversationKey, watch::Sender<Vec<StoredMessage>>>,
    match_views: HashMap<ConversationKey, watch::Sender<MatchState>>,
    list_tx: watch::Sender<Vec<ConversationEntry>>,
    status_tx: watch::Sender<SyncStatus>,

    internal_tx: mpsc::Sender<Internal>,
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut internal: mpsc::Receiver<Internal>,
        mut push_events: mpsc::Receiver<PushEvent>,
    ) {
        info!("Sync engine started");

        let mut conversation_tick = interval(self.config.conversation_poll_interval);
        conversation_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut message_tick = interval(self.config.message_poll_interval);
        message_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.spawn_connect(Duration::ZERO);
        let mut push_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(EngineCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },

                Some(event) = internal.recv() => self.handle_internal(event).await,

                event = push_events.recv(), if push_open => match event {
                    Some(event) => self.handle_push(event).await,
                    None => {
                        warn!("Push event channel closed");
                        push_open = false;
                    }
                },

                _ = conversation_tick.tick() => self.poll_conversations(),

                _ = message_tick.tick() => {
                    if let Some(key) = self.scheduler.active_key().cloned() {
                        if !self.gate(&key).can_send {
                            self.fetch_facts(key.clone());
                        }
                        self.poll_messages(key);
                    }
                }
            }
        }

        self.release_active_room().await;
        info!("Sync engine stopped");
    }

    // -- Commands -------------------------------------------------------------

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SelectConversation { route, reply } => {
                let result = self.select_conversation(&route).await;
                let _ = reply.send(result);
            }
            EngineCommand::Send {
                key,
                body,
                attachments,
                reply,
            } => self.send(key, body, attachments, reply),
            EngineCommand::WatchMessages { key, reply } => {
                let snapshot = self.store.messages(&key);
                let rx = self
                    .message_views
                    .entry(key)
                    .or_insert_with(|| watch::channel(snapshot).0)
                    .subscribe();
                let _ = reply.send(rx);
            }
            EngineCommand::WatchMatchState { key, reply } => {
                let state = self.gate(&key);
                let rx = self
                    .match_views
                    .entry(key.clone())
                    .or_insert_with(|| watch::channel(state).0)
                    .subscribe();
                let _ = reply.send(rx);
                if !self.facts.contains_key(&key) {
                    self.fetch_facts(key);
                }
            }
            EngineCommand::LoadOlder { key, reply } => self.load_older(key, reply),
            EngineCommand::DiscardFailed { key, token, reply } => {
                let discarded = self.store.discard_failed(&key, &token);
                if discarded {
                    debug!(key = %key, token = %token, "Discarded failed message");
                    self.publish_messages(&key);
                }
                let _ = reply.send(discarded);
            }
            EngineCommand::RefreshMatchState(key) => self.fetch_facts(key),
            EngineCommand::DismissPollError => {
                if self.scheduler.dismiss_poll_error() {
                    self.publish_status();
                }
            }
            EngineCommand::Shutdown => {}
        }
    }

    /// Open `raw` as the active conversation.
    ///
    /// Handover order: subscribe the new room, switch the active key, then
    /// unsubscribe the previous room, so no push is missed in between.
    async fn select_conversation(&mut self, raw: &str) -> Result<ConversationRoute, EngineError> {
        let route = classify(raw)?;
        let key = route.key.clone();
        if self.scheduler.active_key() == Some(&key) {
            return Ok(route);
        }

        let room = route.room_key(&self.session.current_user_id());
        info!(key = %key, room = %room, "Switching conversation");

        self.subscribe_room(&key, &room).await;
        let previous = self.scheduler.set_active(key.clone(), room.clone());
        if let Some((previous_key, previous_room)) = previous {
            if previous_room != room {
                self.unsubscribe_room(&previous_key, &previous_room).await;
            }
        }

        let was_virtual = self.conversations.virtual_key() == Some(&key);
        if self.conversations.set_virtual(key.clone()) && !was_virtual {
            debug!(key = %key, "Showing virtual conversation");
            self.resolve_meta(key.clone());
        }
        self.publish_list();

        self.fetch_facts(key.clone());
        self.poll_messages(key);
        Ok(route)
    }

    fn send(
        &mut self,
        key: ConversationKey,
        body: String,
        attachments: Vec<AttachmentCandidate>,
        reply: SendReply,
    ) {
        if body.trim().is_empty() && attachments.is_empty() {
            refuse(reply, ValidationError::EmptyMessage.into(), attachments);
            return;
        }
        if attachments.len() > MAX_ATTACHMENTS {
            let rejection = AttachmentRejection::TooMany {
                staged: attachments.len(),
                incoming: 0,
                max: MAX_ATTACHMENTS,
            };
            refuse(reply, ValidationError::from(rejection).into(), attachments);
            return;
        }

        let state = self.gate(&key);
        if !state.can_send {
            if state.is_provisional_denial() {
                debug!(key = %key, "Gating facts not loaded, leaving the decision to the server");
            } else {
                info!(key = %key, status = ?state.status, "Send refused by match gate");
                let reason = state.reason_message.unwrap_or_default();
                refuse(reply, SendError::GatingDenied { reason }, attachments);
                return;
            }
        }

        let token = CorrelationToken::new();
        let local_refs = attachments.iter().map(|a| a.to_local_ref()).collect();
        self.store.insert_optimistic(
            &key,
            self.session.current_user_id(),
            body.clone(),
            local_refs,
            token,
        );
        self.publish_messages(&key);
        debug!(key = %key, token = %token, attachments = attachments.len(), "Sending message");

        let outgoing = attachments.iter().map(|a| a.to_outgoing()).collect();
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let limit = self.config.request_timeout;
        tokio::spawn(async move {
            let result = bounded(limit, api.send_message(&key, &body, outgoing, token)).await;
            let _ = tx
                .send(Internal::SendFinished {
                    key,
                    token,
                    result,
                    reply,
                    attachments,
                })
                .await;
        });
    }

    fn load_older(
        &mut self,
        key: ConversationKey,
        reply: oneshot::Sender<Result<usize, EngineError>>,
    ) {
        if !self.scheduler.begin_poll(PollTarget::OlderMessages(key.clone())) {
            let _ = reply.send(Ok(0));
            return;
        }
        let offset = u32::try_from(self.store.persisted_count(&key)).unwrap_or(u32::MAX);
        debug!(key = %key, offset, "Loading older messages");

        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let limit = self.config.request_timeout;
        let page = self.config.page_size;
        tokio::spawn(async move {
            let result = bounded(limit, api.list_messages(&key, page, offset)).await;
            let _ = tx.send(Internal::OlderLoaded { key, result, reply }).await;
        });
    }

    // -- Results from spawned tasks -------------------------------------------

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::ConversationsPolled(result) => {
                let target = PollTarget::Conversations;
                self.scheduler.finish_poll(&target);
                match result {
                    Ok(records) => {
                        let applied = self.conversations.apply_snapshot(records);
                        if applied.rejected > 0 {
                            debug!(rejected = applied.rejected, "Conversation snapshot had malformed rows");
                        }
                        self.scheduler.record_poll_success(&target);
                        self.publish_list();
                    }
                    Err(e) => self
                        .scheduler
                        .record_poll_failure(&target, e.kind(), e.to_string()),
                }
                self.publish_status();
            }

            // A late result for a conversation left behind is still merged.
            // The scheduler keeps it out of the status.
            Internal::MessagesPolled { key, result } => {
                let target = PollTarget::Messages(key.clone());
                self.scheduler.finish_poll(&target);
                match result {
                    Ok(records) => {
                        let merged = self.store.merge(&key, records, SourceHint::Poll);
                        self.scheduler.record_poll_success(&target);
                        if merged.changed() {
                            self.publish_messages(&key);
                            self.publish_match_state(&key);
                        }
                    }
                    Err(e) => self
                        .scheduler
                        .record_poll_failure(&target, e.kind(), e.to_string()),
                }
                self.publish_status();
            }

            Internal::OlderLoaded { key, result, reply } => {
                self.scheduler
                    .finish_poll(&PollTarget::OlderMessages(key.clone()));
                let outcome = match result {
                    Ok(records) => {
                        let merged = self.store.merge(&key, records, SourceHint::Poll);
                        if merged.changed() {
                            self.publish_messages(&key);
                            self.publish_match_state(&key);
                        }
                        Ok(merged.inserted)
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Loading older messages failed");
                        Err(EngineError::Api(e))
                    }
                };
                let _ = reply.send(outcome);
            }

            Internal::FactsLoaded { key, result } => {
                self.scheduler
                    .finish_poll(&PollTarget::MatchFacts(key.clone()));
                match result {
                    Ok(facts) => {
                        debug!(key = %key, facts = ?facts, "Match facts loaded");
                        self.facts.insert(key.clone(), facts);
                        self.publish_match_state(&key);
                    }
                    Err(ApiError::NotFound(what)) => {
                        debug!(key = %key, missing = %what, "No match facts on record")
                    }
                    Err(e) => warn!(key = %key, error = %e, "Failed to load match facts"),
                }
            }

            Internal::MetaResolved { key, result } => match result {
                Ok(record) => {
                    let meta = ConversationMeta {
                        display_name: record
                            .display_name
                            .or_else(|| ConversationMeta::placeholder(&key).display_name),
                        avatar_url: record.avatar_url,
                    };
                    if self.conversations.resolve_virtual_meta(&key, meta) {
                        self.publish_list();
                    }
                }
                Err(e) => debug!(key = %key, error = %e, "Directory lookup failed, keeping placeholder"),
            },

            Internal::SendFinished {
                key,
                token,
                result,
                reply,
                attachments,
            } => {
                let outcome = self
                    .finish_send(&key, token, result)
                    .map_err(|error| SendFailure {
                        error,
                        returned: attachments,
                    });
                self.publish_messages(&key);
                self.publish_match_state(&key);
                let _ = reply.send(outcome);
            }

            Internal::PushConnectFinished(result) => match result {
                Ok(()) => self.on_push_connected().await,
                Err(e) => {
                    if self.scheduler.push_health() != PushHealth::Connected {
                        warn!(error = %e, "Push connect failed");
                        self.schedule_reconnect();
                    }
                }
            },
        }
    }

    fn finish_send(
        &mut self,
        key: &ConversationKey,
        token: CorrelationToken,
        result: Result<MessageRecord, ApiError>,
    ) -> Result<Message, SendError> {
        let error = match result {
            Ok(mut record) => {
                record.client_token.get_or_insert_with(|| token.to_string());
                match Message::from_record(record.clone(), key, SourceHint::Poll) {
                    Ok(message) => {
                        self.store.merge(key, [record], SourceHint::Poll);
                        info!(key = %key, id = %message.id, "Message sent");
                        return Ok(message);
                    }
                    Err(e) => SendError::Server(format!("unreadable send response: {e}")),
                }
            }
            Err(e) => SendError::from(e),
        };

        warn!(key = %key, token = %token, error = %error, "Send failed");
        self.store.mark_failed(key, &token, error.to_string());
        Err(error)
    }

    // -- Push -----------------------------------------------------------------

    async fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Connected => self.on_push_connected().await,
            PushEvent::Message { room, record } => self.on_push_message(&room, record),
            PushEvent::Disconnected { reason } => {
                if self.scheduler.push_health() == PushHealth::Connected {
                    warn!(reason = %reason, "Push channel disconnected");
                    self.schedule_reconnect();
                } else {
                    debug!(reason = %reason, "Push disconnect while not connected");
                }
            }
        }
    }

    async fn on_push_connected(&mut self) {
        if self.scheduler.push_health() == PushHealth::Connected {
            return;
        }
        info!("Push channel connected");
        self.scheduler.push_connected();
        self.publish_status();

        let active = self
            .scheduler
            .active_key()
            .cloned()
            .zip(self.scheduler.active_room().cloned());
        if let Some((key, room)) = active {
            self.subscribe_room(&key, &room).await;
        }
    }

    fn on_push_message(&mut self, room: &RoomKey, record: MessageRecord) {
        let key = match self.scheduler.key_for_room(room) {
            Some(key) => key.clone(),
            None => match record.conversation.as_deref().map(classify) {
                Some(Ok(route)) => route.key,
                _ => {
                    debug!(room = %room, "Push message for an unknown room, dropping");
                    return;
                }
            },
        };

        let merged = self.store.merge(&key, [record], SourceHint::Push);
        if merged.changed() {
            self.publish_messages(&key);
            self.publish_match_state(&key);
        }
    }

    fn schedule_reconnect(&mut self) {
        match self.scheduler.push_lost() {
            Some(delay) => {
                info!(
                    delay_ms = delay.as_millis() as u64,
                    health = ?self.scheduler.push_health(),
                    "Scheduling push reconnect"
                );
                self.spawn_connect(delay);
            }
            None => warn!("Push unavailable, continuing in poll-only mode"),
        }
        self.publish_status();
    }

    fn spawn_connect(&self, delay: Duration) {
        let push = Arc::clone(&self.push);
        let tx = self.internal_tx.clone();
        let limit = self.config.request_timeout;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = bounded(limit, push.connect()).await;
            let _ = tx.send(Internal::PushConnectFinished(result)).await;
        });
    }

    async fn subscribe_room(&mut self, key: &ConversationKey, room: &RoomKey) {
        if !self.scheduler.begin_subscribe(key, room) {
            return;
        }
        let result = bounded(self.config.request_timeout, self.push.subscribe(room)).await;
        if let Err(e) = &result {
            warn!(room = %room, error = %e, "Push subscribe failed");
        }
        self.scheduler.subscribe_finished(room, result.is_ok());
    }

    async fn unsubscribe_room(&mut self, key: &ConversationKey, room: &RoomKey) {
        if !self.scheduler.begin_unsubscribe(room) {
            return;
        }
        if let Err(e) = bounded(self.config.request_timeout, self.push.unsubscribe(room)).await {
            debug!(key = %key, room = %room, error = %e, "Push unsubscribe failed");
        }
        self.scheduler.unsubscribe_finished(room);
    }

    async fn release_active_room(&mut self) {
        let active = self
            .scheduler
            .active_key()
            .cloned()
            .zip(self.scheduler.active_room().cloned());
        if let Some((key, room)) = active {
            self.unsubscribe_room(&key, &room).await;
        }
    }

    // -- Polls ----------------------------------------------------------------

    fn poll_conversations(&mut self) {
        if !self.scheduler.begin_poll(PollTarget::Conversations) {
            return;
        }
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let limit = self.config.request_timeout;
        let page = self.config.page_size;
        tokio::spawn(async move {
            let result = bounded(limit, api.list_conversations(page, 0)).await;
            let _ = tx.send(Internal::ConversationsPolled(result)).await;
        });
    }

    fn poll_messages(&mut self, key: ConversationKey) {
        if !self.scheduler.begin_poll(PollTarget::Messages(key.clone())) {
            return;
        }
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let limit = self.config.request_timeout;
        let page = self.config.page_size;
        tokio::spawn(async move {
            let result = bounded(limit, api.list_messages(&key, page, 0)).await;
            let _ = tx.send(Internal::MessagesPolled { key, result }).await;
        });
    }

    fn fetch_facts(&mut self, key: ConversationKey) {
        if !self.scheduler.begin_poll(PollTarget::MatchFacts(key.clone())) {
            return;
        }
        let api = Arc::clone(&self.api);
        let tx = self.internal_tx.clone();
        let limit = self.config.request_timeout;
        tokio::spawn(async move {
            let result = load_facts(api.as_ref(), &key, limit).await;
            let _ = tx.send(Internal::FactsLoaded { key, result }).await;
        });
    }

    fn resolve_meta(&self, key: ConversationKey) {
        let directory = Arc::clone(&self.directory);
        let tx = self.internal_tx.clone();
        let limit = self.config.request_timeout;
        tokio::spawn(async move {
            let result = bounded(limit, directory.resolve(&key)).await;
            let _ = tx.send(Internal::MetaResolved { key, result }).await;
        });
    }

    // -- Views ----------------------------------------------------------------

    fn gate(&self, key: &ConversationKey) -> MatchState {
        let unknown = MatchFacts::Unknown;
        let facts = self.facts.get(key).unwrap_or(&unknown);
        evaluate(
            key.clone(),
            key.kind(),
            facts,
            self.store.has_persisted_messages(key),
        )
    }

    fn publish_messages(&mut self, key: &ConversationKey) {
        if self.message_views.contains_key(key) {
            let snapshot = self.store.messages(key);
            publish_view(&mut self.message_views, key, snapshot);
        }
    }

    fn publish_match_state(&mut self, key: &ConversationKey) {
        if self.match_views.contains_key(key) {
            let state = self.gate(key);
            publish_view(&mut self.match_views, key, state);
        }
    }

    fn publish_list(&self) {
        let entries = self.conversations.entries();
        self.list_tx
            .send_if_modified(|current| replace_if_changed(current, entries));
    }

    fn publish_status(&self) {
        let status = self.scheduler.status();
        self.status_tx
            .send_if_modified(|current| replace_if_changed(current, status));
    }
}

fn refuse(reply: SendReply, error: SendError, returned: Vec<AttachmentCandidate>) {
    let _ = reply.send(Err(SendFailure { error, returned }));
}

/// Hand `next` to the watchers of `key`. A view nobody watches any more is
/// dropped; the next subscription recreates it from current state.
fn publish_view<T: PartialEq>(
    views: &mut HashMap<ConversationKey, watch::Sender<T>>,
    key: &ConversationKey,
    next: T,
) {
    let Some(tx) = views.get(key) else {
        return;
    };
    if tx.receiver_count() == 0 {
        debug!(key = %key, "Dropping unwatched view");
        views.remove(key);
        return;
    }
    tx.send_if_modified(|current| replace_if_changed(current, next));
}

fn replace_if_changed<T: PartialEq>(current: &mut T, next: T) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

/// Apply the request timeout; an elapsed timeout is a transient failure.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(ApiError::Timeout))
}

async fn load_facts(
    api: &dyn ChatApi,
    key: &ConversationKey,
    limit: Duration,
) -> Result<MatchFacts, ApiError> {
    let route = classify(key.as_str()).ok();
    match route.and_then(|r| r.club_id.zip(r.event_id)) {
        Some((club, event)) => bounded(limit, api.event_participation(&club, &event))
            .await
            .map(MatchFacts::from),
        None if key.kind() == ConversationKind::User => {
            bounded(limit, api.match_status(key)).await.map(MatchFacts::from)
        }
        // A club room without an event has no participation record.
        None => Ok(MatchFacts::Unknown),
    }
}
