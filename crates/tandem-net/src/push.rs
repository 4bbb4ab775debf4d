//! WebSocket push channel.
//!
//! A connection is two tasks: a writer fed by a control mpsc and a read pump
//! that turns text frames into [`PushEvent`]s. Both end when the socket
//! closes; the pump reports `Disconnected` and the engine decides whether to
//! reconnect.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use tandem_shared::protocol::{PushControl, PushFrame};
use tandem_shared::RoomKey;

use crate::api::{PushChannel, PushEvent, SessionProvider};
use crate::error::ApiError;

type WsStream = futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type WsSink = futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Control sender of the live connection, tagged with the connection
/// generation so a stale read pump never clears a newer connection.
#[derive(Default)]
struct Live {
    generation: u64,
    control: Option<mpsc::Sender<PushControl>>,
}

/// Push channel over a single WebSocket connection.
pub struct WsPushChannel {
    url: String,
    session: Arc<dyn SessionProvider>,
    event_tx: mpsc::Sender<PushEvent>,
    live: Arc<Mutex<Live>>,
}

impl WsPushChannel {
    /// Build an unconnected channel and the receiver its events arrive on.
    pub fn new(
        url: impl Into<String>,
        session: Arc<dyn SessionProvider>,
    ) -> (Self, mpsc::Receiver<PushEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let channel = Self {
            url: url.into(),
            session,
            event_tx,
            live: Arc::new(Mutex::new(Live::default())),
        };
        (channel, event_rx)
    }

    async fn control(&self, frame: PushControl) -> Result<(), ApiError> {
        let sender = self.live.lock().await.control.clone();
        match sender {
            Some(tx) => tx.send(frame).await.map_err(|_| ApiError::Disconnected),
            None => Err(ApiError::Disconnected),
        }
    }
}

#[async_trait]
impl PushChannel for WsPushChannel {
    async fn connect(&self) -> Result<(), ApiError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = self.session.bearer_token() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::Url(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        info!(url = %self.url, "Connecting push channel");
        let (ws, _response) = connect_async(request).await?;
        let (sink, stream) = ws.split();

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let generation = {
            let mut live = self.live.lock().await;
            live.generation += 1;
            live.control = Some(control_tx);
            live.generation
        };

        tokio::spawn(write_pump(sink, control_rx));
        tokio::spawn(read_pump(
            stream,
            self.event_tx.clone(),
            Arc::clone(&self.live),
            generation,
        ));

        let _ = self.event_tx.send(PushEvent::Connected).await;
        Ok(())
    }

    async fn subscribe(&self, room: &RoomKey) -> Result<(), ApiError> {
        debug!(room = %room.as_str(), "Subscribing");
        self.control(PushControl::Subscribe { room: room.clone() })
            .await
    }

    async fn unsubscribe(&self, room: &RoomKey) -> Result<(), ApiError> {
        debug!(room = %room.as_str(), "Unsubscribing");
        self.control(PushControl::Unsubscribe { room: room.clone() })
            .await
    }
}

async fn write_pump(mut sink: WsSink, mut control_rx: mpsc::Receiver<PushControl>) {
    while let Some(frame) = control_rx.recv().await {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode control frame");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::text(text)).await {
            warn!(error = %e, "Push write failed, closing writer");
            break;
        }
    }
    let _ = sink.close().await;
    trace!("Push writer stopped");
}

async fn read_pump(
    mut stream: WsStream,
    event_tx: mpsc::Sender<PushEvent>,
    live: Arc<Mutex<Live>>,
    generation: u64,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(msg)) if msg.is_text() => {
                let Ok(text) = msg.to_text() else {
                    continue;
                };
                let Some(event) = frame_to_event(text) else {
                    continue;
                };
                if event_tx.send(event).await.is_err() {
                    warn!("Event receiver dropped, closing read pump");
                    break "receiver dropped".to_string();
                }
            }
            Some(Ok(msg)) if msg.is_close() => {
                trace!("Received close frame");
                break "closed by server".to_string();
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "Error reading from push socket");
                break e.to_string();
            }
            None => break "stream ended".to_string(),
        }
    };

    {
        let mut live = live.lock().await;
        if live.generation == generation {
            live.control = None;
        }
    }
    let _ = event_tx.send(PushEvent::Disconnected { reason }).await;
}

/// Map one text frame to an engine event. Acks and unparsable frames are
/// logged and produce nothing.
fn frame_to_event(text: &str) -> Option<PushEvent> {
    match PushFrame::from_text(text) {
        Ok(PushFrame::Message { room, message }) => Some(PushEvent::Message {
            room,
            record: message,
        }),
        Ok(PushFrame::Subscribed { room }) => {
            debug!(room = %room.as_str(), "Subscription acknowledged");
            None
        }
        Ok(PushFrame::Unsubscribed { room }) => {
            debug!(room = %room.as_str(), "Unsubscription acknowledged");
            None
        }
        Ok(PushFrame::Error { message }) => {
            warn!(message = %message, "Push server reported an error");
            None
        }
        Err(e) => {
            warn!(error = %e, "Dropping malformed push frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StaticSession;
    use tandem_shared::UserId;

    #[test]
    fn test_message_frame_becomes_event() {
        let text = r#"{"type":"message","room":"user:alice:me","message":{"id":9,"body":"yo"}}"#;
        match frame_to_event(text) {
            Some(PushEvent::Message { room, record }) => {
                assert_eq!(room.as_str(), "user:alice:me");
                assert_eq!(record.body.as_deref(), Some("yo"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_acks_and_garbage_produce_nothing() {
        assert!(frame_to_event(r#"{"type":"subscribed","room":"club:1"}"#).is_none());
        assert!(frame_to_event(r#"{"type":"error","message":"nope"}"#).is_none());
        assert!(frame_to_event("not json").is_none());
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_is_disconnected() {
        let session = Arc::new(StaticSession::new(UserId::new("me"), None));
        let (channel, _rx) = WsPushChannel::new("ws://127.0.0.1:9/push", session);
        let result = channel.subscribe(&RoomKey("user:a:me".into())).await;
        assert!(matches!(result, Err(ApiError::Disconnected)));
    }
}
