pub mod protocol;

use crate::config::schema::StreamConfig;
use futures::{SinkExt, StreamExt};
use protocol::{decode_frame, SubscribeFrame};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Topics whose payloads are device collections.
pub const DEVICE_TOPICS: [&str; 3] = ["switches", "alarms", "switchgroups"];

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection lifecycle of the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Waiting out the reconnect delay.
    Reconnecting,
}

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    /// One top-level key of an update's `data` object.
    Key(String),
    /// The whole `data` object.
    All,
}

/// A decoded push notification.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub guild_id: String,
    pub topic: Topic,
    pub payload: serde_json::Value,
}

/// Listener that only sees [`Topic::Key`] events for a fixed set of keys.
pub struct StreamSubscription {
    rx: broadcast::Receiver<StreamEvent>,
    topics: Vec<String>,
}

impl StreamSubscription {
    /// Next matching event, or `None` once the client is dropped.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Topic::Key(key) = &event.topic {
                        if self.topics.iter().any(|t| t == key) {
                            return Some(event);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("stream listener lagged, missed {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Persistent, self-healing connection to the backend's event stream.
///
/// One background task owns the socket. It re-sends the same subscription
/// every time the socket opens and retries after a fixed delay whenever the
/// connection drops, until [`StreamClient::disconnect`] is called.
pub struct StreamClient {
    config: StreamConfig,
    state: Arc<RwLock<ConnectionState>>,
    events: broadcast::Sender<StreamEvent>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl StreamClient {
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            events,
            task: Mutex::new(None),
        }
    }

    /// Start the connection task. A no-op while the task is running.
    pub fn connect(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, handle)) = task.as_ref() {
            if !handle.is_finished() {
                debug!("event stream already running");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_stream_task(
            self.config.clone(),
            Arc::clone(&self.state),
            self.events.clone(),
            cancel.clone(),
        ));
        *task = Some((cancel, handle));
    }

    /// Close the socket and stop reconnecting.
    pub async fn disconnect(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some((cancel, handle)) = task {
            cancel.cancel();
            let _ = handle.await;
        }
        set_state(&self.state, ConnectionState::Disconnected);
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Every notification, including [`Topic::All`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn subscribe_topics(&self, topics: &[&str]) -> StreamSubscription {
        StreamSubscription {
            rx: self.events.subscribe(),
            topics: topics.iter().map(ToString::to_string).collect(),
        }
    }
}

fn set_state(state: &RwLock<ConnectionState>, next: ConnectionState) {
    let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
    if *guard != next {
        debug!("event stream {:?} -> {next:?}", *guard);
        *guard = next;
    }
}

async fn run_stream_task(
    config: StreamConfig,
    state: Arc<RwLock<ConnectionState>>,
    events: broadcast::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let delay = Duration::from_millis(config.reconnect_delay_ms);

    loop {
        set_state(&state, ConnectionState::Connecting);

        let connected = tokio::select! {
            () = cancel.cancelled() => break,
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
        };

        match connected {
            Ok((ws, _)) => {
                info!("event stream connected to {}", config.url);
                set_state(&state, ConnectionState::Open);
                run_session(ws, &config, &events, &cancel).await;
            }
            Err(e) => warn!("event stream connect to {} failed: {e}", config.url),
        }

        set_state(&state, ConnectionState::Disconnected);
        if cancel.is_cancelled() {
            break;
        }

        set_state(&state, ConnectionState::Reconnecting);
        debug!("event stream retrying in {delay:?}");
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    set_state(&state, ConnectionState::Disconnected);
    debug!("event stream task exiting");
}

/// Serve one open socket until it closes or the task is cancelled.
async fn run_session(
    ws: WsStream,
    config: &StreamConfig,
    events: &broadcast::Sender<StreamEvent>,
    cancel: &CancellationToken,
) {
    let (mut sink, mut stream) = ws.split();

    let subscribe = SubscribeFrame::new(&config.guild_id, &config.endpoints);
    let text = match serde_json::to_string(&subscribe) {
        Ok(text) => text,
        Err(e) => {
            warn!("failed to encode subscribe frame: {e}");
            return;
        }
    };
    if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
        warn!("event stream subscribe failed: {e}");
        return;
    }
    debug!(
        "subscribed guild {} to {:?}",
        config.guild_id, config.endpoints
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return;
            }

            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match decode_frame(text.as_str(), &config.guild_id) {
                        Ok(decoded) => {
                            for event in decoded {
                                // No listeners is fine.
                                let _ = events.send(event);
                            }
                        }
                        Err(e) => warn!("dropping stream frame: {e}"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("event stream closed by server");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("event stream read error: {e}");
                    return;
                }
            },
        }
    }
}
