#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use tandem_client::{spawn_engine, EngineHandle, EngineServices, LocalFile, PreviewProvider, SyncConfig};
use tandem_net::{
    ApiError, ChatApi, Directory, OutgoingAttachment, PushChannel, PushEvent, StaticSession,
};
use tandem_shared::protocol::{
    AttachmentRecord, ConversationRecord, DirectoryRecord, MatchStatusRecord, MessageRecord,
    ParticipationRecord,
};
use tandem_shared::{ConversationKey, CorrelationToken, MessageId, RoomKey, UserId};

pub const ME: &str = "me";

pub async fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub const WAIT: Duration = Duration::from_secs(5);

pub fn key(raw: &str) -> ConversationKey {
    ConversationKey::parse(raw).unwrap()
}

pub fn at(second: u32) -> String {
    format!("2024-05-01T10:00:{second:02}Z")
}

pub fn message(id: &str, sender: &str, body: &str, second: u32) -> MessageRecord {
    MessageRecord {
        id: Some(MessageId::new(id)),
        conversation: None,
        sender_id: Some(sender.into()),
        body: Some(body.into()),
        attachments: Vec::new(),
        created_at: Some(at(second)),
        client_token: None,
    }
}

pub fn conversation(raw_key: &str, second: u32) -> ConversationRecord {
    ConversationRecord {
        key: Some(raw_key.into()),
        last_message: Some(format!("latest in {raw_key}")),
        last_message_at: Some(at(second)),
        unread_count: Some(0),
        ..Default::default()
    }
}

pub fn pending_like() -> MatchStatusRecord {
    MatchStatusRecord {
        i_liked: Some(true),
        liked_me: Some(false),
        is_match: Some(false),
    }
}

pub fn mutual() -> MatchStatusRecord {
    MatchStatusRecord {
        i_liked: Some(true),
        liked_me: Some(true),
        is_match: Some(true),
    }
}

// ---------------------------------------------------------------------------
// REST double
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub key: String,
    pub body: String,
    pub attachments: Vec<OutgoingAttachment>,
    pub token: CorrelationToken,
}

#[derive(Default)]
pub struct FakeApi {
    pub conversations: Mutex<Vec<ConversationRecord>>,
    /// Chronological per conversation key.
    pub messages: Mutex<HashMap<String, Vec<MessageRecord>>>,
    pub likes: Mutex<HashMap<String, MatchStatusRecord>>,
    /// Keyed by `club:event`.
    pub participation: Mutex<HashMap<String, ParticipationRecord>>,
    /// HTTP status every send fails with, if set.
    pub send_failure: Mutex<Option<u16>>,
    pub fail_polls: AtomicBool,
    /// Message polls for these keys fail with a 500 after the delay.
    pub slow_failures: Mutex<HashMap<String, Duration>>,
    pub participation_calls: AtomicUsize,
    pub likes_calls: AtomicUsize,
    pub sent: Mutex<Vec<SentMessage>>,
    pub message_offsets: Mutex<Vec<(String, u32)>>,
    next_id: AtomicU64,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            ..Default::default()
        }
    }

    pub fn with_likes(self, peer: &str, record: MatchStatusRecord) -> Self {
        self.likes.lock().unwrap().insert(peer.into(), record);
        self
    }

    pub fn set_likes(&self, peer: &str, record: MatchStatusRecord) {
        self.likes.lock().unwrap().insert(peer.into(), record);
    }

    pub fn with_slow_failure(self, raw_key: &str, delay: Duration) -> Self {
        self.slow_failures
            .lock()
            .unwrap()
            .insert(raw_key.into(), delay);
        self
    }

    pub fn with_participation(self, club: &str, event: &str, status: &str) -> Self {
        self.participation.lock().unwrap().insert(
            format!("{club}:{event}"),
            ParticipationRecord {
                status: Some(status.into()),
            },
        );
        self
    }

    pub fn with_messages(self, raw_key: &str, records: Vec<MessageRecord>) -> Self {
        self.messages
            .lock()
            .unwrap()
            .insert(raw_key.into(), records);
        self
    }

    pub fn add_message(&self, raw_key: &str, record: MessageRecord) {
        self.messages
            .lock()
            .unwrap()
            .entry(raw_key.into())
            .or_default()
            .push(record);
    }

    pub fn set_conversations(&self, records: Vec<ConversationRecord>) {
        *self.conversations.lock().unwrap() = records;
    }

    pub fn fail_sends_with(&self, status: u16) {
        *self.send_failure.lock().unwrap() = Some(status);
    }

    fn poll_guard(&self) -> Result<(), ApiError> {
        if self.fail_polls.load(Ordering::SeqCst) {
            Err(ApiError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_conversations(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ConversationRecord>, ApiError> {
        self.poll_guard()?;
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_messages(
        &self,
        key: &ConversationKey,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        self.poll_guard()?;
        let slow = self.slow_failures.lock().unwrap().get(key.as_str()).copied();
        if let Some(delay) = slow {
            tokio::time::sleep(delay).await;
            return Err(ApiError::Server {
                status: 500,
                message: "late failure".into(),
            });
        }
        self.message_offsets
            .lock()
            .unwrap()
            .push((key.to_string(), offset));
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .get(key.as_str())
            .map(|all| {
                all.iter()
                    .rev()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        key: &ConversationKey,
        body: &str,
        attachments: Vec<OutgoingAttachment>,
        client_token: CorrelationToken,
    ) -> Result<MessageRecord, ApiError> {
        if let Some(status) = *self.send_failure.lock().unwrap() {
            return Err(match status {
                403 => ApiError::Forbidden("Not a match".into()),
                status => ApiError::Server {
                    status,
                    message: "unavailable".into(),
                },
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = MessageRecord {
            id: Some(MessageId::new(id.to_string())),
            conversation: Some(key.to_string()),
            sender_id: Some(ME.into()),
            body: Some(body.into()),
            attachments: attachments
                .iter()
                .map(|a| AttachmentRecord {
                    url: Some(format!("https://cdn.tandem.test/{id}/{}", a.name)),
                    name: Some(a.name.clone()),
                    media_type: Some(a.media_type.clone()),
                    size: Some(a.data.len() as u64),
                })
                .collect(),
            created_at: Some(Utc::now().to_rfc3339()),
            client_token: Some(client_token.to_string()),
        };

        self.sent.lock().unwrap().push(SentMessage {
            key: key.to_string(),
            body: body.into(),
            attachments,
            token: client_token,
        });
        self.add_message(key.as_str(), record.clone());
        Ok(record)
    }

    async fn match_status(&self, peer: &ConversationKey) -> Result<MatchStatusRecord, ApiError> {
        self.likes_calls.fetch_add(1, Ordering::SeqCst);
        self.likes
            .lock()
            .unwrap()
            .get(peer.as_str())
            .cloned()
            .ok_or_else(|| ApiError::NotFound(peer.to_string()))
    }

    async fn event_participation(
        &self,
        club_id: &str,
        event_id: &str,
    ) -> Result<ParticipationRecord, ApiError> {
        self.participation_calls.fetch_add(1, Ordering::SeqCst);
        self.participation
            .lock()
            .unwrap()
            .get(&format!("{club_id}:{event_id}"))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("{club_id}/{event_id}")))
    }
}

pub struct FakeDirectory;

#[async_trait]
impl Directory for FakeDirectory {
    async fn resolve(&self, key: &ConversationKey) -> Result<DirectoryRecord, ApiError> {
        Ok(DirectoryRecord {
            display_name: Some(format!("{key} (profile)")),
            avatar_url: Some(format!("https://cdn.tandem.test/avatars/{key}.jpg")),
        })
    }
}

// ---------------------------------------------------------------------------
// Push double
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCall {
    Connect,
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Default)]
pub struct FakePush {
    pub calls: Mutex<Vec<PushCall>>,
    pub refuse_connect: AtomicBool,
}

impl FakePush {
    pub fn refusing() -> Self {
        Self {
            refuse_connect: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<PushCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &PushCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl PushChannel for FakePush {
    async fn connect(&self) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(PushCall::Connect);
        if self.refuse_connect.load(Ordering::SeqCst) {
            Err(ApiError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }

    async fn subscribe(&self, room: &RoomKey) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(PushCall::Subscribe(room.to_string()));
        Ok(())
    }

    async fn unsubscribe(&self, room: &RoomKey) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(PushCall::Unsubscribe(room.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Previews
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CountingPreviews {
    live: Mutex<HashSet<Uuid>>,
}

impl CountingPreviews {
    pub fn live(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

impl PreviewProvider for CountingPreviews {
    fn acquire(&self, local_id: Uuid, _file: &LocalFile) -> String {
        self.live.lock().unwrap().insert(local_id);
        format!("blob:{local_id}")
    }

    fn release(&self, local_id: Uuid) {
        self.live.lock().unwrap().remove(&local_id);
    }
}

pub fn image(name: &str) -> LocalFile {
    LocalFile::new(name, "image/png", vec![7u8; 64])
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn test_config() -> SyncConfig {
    SyncConfig {
        conversation_poll_interval: Duration::from_millis(40),
        message_poll_interval: Duration::from_millis(25),
        request_timeout: Duration::from_secs(2),
        push_reconnect_attempts: 3,
        push_reconnect_base_delay: Duration::from_millis(10),
        ..SyncConfig::default()
    }
}

pub struct Harness {
    pub engine: EngineHandle,
    pub api: Arc<FakeApi>,
    pub push: Arc<FakePush>,
    pub push_tx: mpsc::Sender<PushEvent>,
}

pub fn start(api: FakeApi, push: FakePush) -> Harness {
    start_with(test_config(), api, push)
}

pub fn start_with(config: SyncConfig, api: FakeApi, push: FakePush) -> Harness {
    let api = Arc::new(api);
    let push = Arc::new(push);
    let (push_tx, push_events) = mpsc::channel(64);
    let session = Arc::new(StaticSession::new(UserId::new(ME), Some("test-token".into())));

    let engine = spawn_engine(
        config,
        EngineServices {
            api: api.clone(),
            directory: Arc::new(FakeDirectory),
            push: push.clone(),
            push_events,
            session,
        },
    );

    Harness {
        engine,
        api,
        push,
        push_tx,
    }
}

impl Harness {
    pub async fn wait_push_connected(&self) {
        let status = self.engine.sync_status();
        wait_until("push connected", WAIT, || {
            status.borrow().push == tandem_client::PushHealth::Connected
        })
        .await;
    }
}
