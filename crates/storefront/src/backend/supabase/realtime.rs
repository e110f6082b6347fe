//! Change feed over the realtime Phoenix-channel socket.
//!
//! One socket task per backend owns the WebSocket. Channel joins and leaves
//! are sent to it as commands; `postgres_changes` frames are routed to the
//! joined channels. The task heartbeats every 30 seconds, reconnects with
//! capped backoff and rejoins every live channel after a reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, warn};

use super::SupabaseBackend;
use crate::backend::{
    BackendError, ChangeEvent, ChangeFilter, ChangeKind, ChannelHandle, RealtimeBackend,
    RealtimeChannel,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

type SocketSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

enum SocketCommand {
    Join(Topic),
    Leave(ChannelHandle),
}

struct Topic {
    handle: ChannelHandle,
    filter: ChangeFilter,
    access_token: String,
    events: mpsc::UnboundedSender<ChangeEvent>,
}

impl Topic {
    fn name(&self) -> String {
        topic_name(&self.handle.name)
    }
}

/// Handle to the socket task.
pub(super) struct RealtimeClient {
    socket_url: String,
    commands: Mutex<Option<mpsc::UnboundedSender<SocketCommand>>>,
    next_id: AtomicU64,
}

impl RealtimeClient {
    pub(super) fn new(api_url: &str, anon_key: &SecretString) -> Self {
        Self {
            socket_url: socket_url(api_url, anon_key.expose_secret()),
            commands: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Sender to the socket task, starting the task on first use.
    fn sender(&self) -> mpsc::UnboundedSender<SocketCommand> {
        let mut commands = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = commands.as_ref()
            && !sender.is_closed()
        {
            return sender.clone();
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(self.socket_url.clone(), receiver));
        *commands = Some(sender.clone());
        sender
    }

    fn join(
        &self,
        name: &str,
        filter: ChangeFilter,
        access_token: String,
    ) -> Result<RealtimeChannel, BackendError> {
        let handle = ChannelHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_owned(),
        };
        let (events, receiver) = mpsc::unbounded_channel();
        self.sender()
            .send(SocketCommand::Join(Topic {
                handle: handle.clone(),
                filter,
                access_token,
                events,
            }))
            .map_err(|_| BackendError::Realtime("socket task stopped".to_owned()))?;
        Ok(RealtimeChannel::new(handle, receiver))
    }

    fn leave(&self, handle: &ChannelHandle) -> Result<(), BackendError> {
        self.sender()
            .send(SocketCommand::Leave(handle.clone()))
            .map_err(|_| BackendError::Realtime("socket task stopped".to_owned()))
    }
}

#[async_trait]
impl RealtimeBackend for SupabaseBackend {
    #[instrument(skip(self, filter))]
    async fn channel(
        &self,
        name: &str,
        filter: ChangeFilter,
    ) -> Result<RealtimeChannel, BackendError> {
        let bearer = self.bearer().await?;
        self.inner.realtime.join(name, filter, bearer)
    }

    async fn remove_channel(&self, handle: &ChannelHandle) -> Result<(), BackendError> {
        self.inner.realtime.leave(handle)
    }
}

// =============================================================================
// Socket task
// =============================================================================

async fn run_socket(url: String, mut commands: mpsc::UnboundedReceiver<SocketCommand>) {
    let mut topics: Vec<Topic> = Vec::new();
    let mut next_ref: u64 = 0;
    let mut delay = RECONNECT_BASE_DELAY;

    loop {
        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!("Realtime socket connected");
                delay = RECONNECT_BASE_DELAY;
                stream
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?delay, "Realtime connect failed");
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    command = commands.recv() => match command {
                        None => return,
                        Some(SocketCommand::Join(topic)) => topics.push(topic),
                        Some(SocketCommand::Leave(handle)) => topics.retain(|t| t.handle != handle),
                    },
                }
                delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                continue;
            }
        };

        let (mut write, mut read) = stream.split();
        let mut connected = true;
        for topic in &topics {
            next_ref += 1;
            connected &= send(&mut write, &join_message(topic, next_ref)).await;
        }

        let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        while connected {
            tokio::select! {
                command = commands.recv() => match command {
                    None => {
                        for topic in &topics {
                            next_ref += 1;
                            send(&mut write, &leave_message(&topic.name(), next_ref)).await;
                        }
                        let _ = write.close().await;
                        return;
                    }
                    Some(SocketCommand::Join(topic)) => {
                        next_ref += 1;
                        connected = send(&mut write, &join_message(&topic, next_ref)).await;
                        topics.push(topic);
                    }
                    Some(SocketCommand::Leave(handle)) => {
                        if let Some(pos) = topics.iter().position(|t| t.handle == handle) {
                            let topic = topics.remove(pos);
                            next_ref += 1;
                            connected = send(&mut write, &leave_message(&topic.name(), next_ref)).await;
                        }
                    }
                },
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    connected = send(&mut write, &heartbeat_message(next_ref)).await;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => dispatch(&topics, text.as_str()),
                    Some(Ok(Message::Ping(data))) => {
                        connected = write.send(Message::Pong(data)).await.is_ok();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime socket closed");
                        connected = false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime socket error");
                        connected = false;
                    }
                },
            }
        }

        topics.retain(|topic| !topic.events.is_closed());
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(RECONNECT_MAX_DELAY);
    }
}

async fn send(write: &mut SocketSink, frame: &JsonValue) -> bool {
    match write.send(Message::text(frame.to_string())).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Failed to send realtime frame");
            false
        }
    }
}

/// Route one incoming frame to the channels it is addressed to.
fn dispatch(topics: &[Topic], text: &str) {
    let frame: JsonValue = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to parse realtime frame");
            return;
        }
    };

    if frame.get("event").and_then(JsonValue::as_str) == Some("phx_reply")
        && frame.pointer("/payload/status").and_then(JsonValue::as_str) == Some("error")
    {
        warn!(topic = ?frame.get("topic"), response = ?frame.pointer("/payload/response"), "Realtime join rejected");
        return;
    }

    let Some((topic_name, event)) = decode_change(&frame) else {
        return;
    };
    for topic in topics {
        if topic.name() == topic_name && topic.filter.accepts(&event) {
            debug!(channel = %topic.handle.name, table = %event.table, "Realtime change");
            let _ = topic.events.send(event.clone());
        }
    }
}

// =============================================================================
// Frames
// =============================================================================

fn topic_name(channel: &str) -> String {
    format!("realtime:{channel}")
}

/// `wss://<project>/realtime/v1/websocket?apikey=<key>&vsn=1.0.0`
fn socket_url(api_url: &str, anon_key: &str) -> String {
    let ws_base = api_url
        .strip_prefix("https://")
        .map(|rest| format!("wss://{rest}"))
        .or_else(|| api_url.strip_prefix("http://").map(|rest| format!("ws://{rest}")))
        .unwrap_or_else(|| api_url.to_owned());
    format!("{ws_base}/realtime/v1/websocket?apikey={anon_key}&vsn=1.0.0")
}

fn join_message(topic: &Topic, reference: u64) -> JsonValue {
    serde_json::json!({
        "topic": topic.name(),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": topic.filter.kind.as_str(),
                    "schema": topic.filter.schema,
                    "table": topic.filter.table,
                }],
            },
            "access_token": topic.access_token,
        },
        "ref": reference.to_string(),
        "join_ref": reference.to_string(),
    })
}

fn leave_message(topic: &str, reference: u64) -> JsonValue {
    serde_json::json!({
        "topic": topic,
        "event": "phx_leave",
        "payload": {},
        "ref": reference.to_string(),
    })
}

fn heartbeat_message(reference: u64) -> JsonValue {
    serde_json::json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
}

/// Decode a `postgres_changes` frame into its topic and change.
fn decode_change(frame: &JsonValue) -> Option<(String, ChangeEvent)> {
    if frame.get("event")?.as_str()? != "postgres_changes" {
        return None;
    }
    let topic = frame.get("topic")?.as_str()?.to_owned();
    let data = frame.pointer("/payload/data")?;
    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(JsonValue::as_str)
        .and_then(ChangeKind::parse)?;
    let table = data.get("table")?.as_str()?.to_owned();
    let record = data
        .get("record")
        .or_else(|| data.get("new"))
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let old_record = data
        .get("old_record")
        .or_else(|| data.get("old"))
        .cloned()
        .unwrap_or(JsonValue::Null);

    Some((
        topic,
        ChangeEvent {
            table,
            kind,
            record,
            old_record,
        },
    ))
}
