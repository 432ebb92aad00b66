use crate::error::{DeckError, Result};
use crate::event::PluginEvent;
use crate::host::protocol::{
    self, ImagePayload, Inbound, Outbound, ProfilePayload, RegisterFrame, RegistrationInfo,
    TitlePayload, UrlPayload,
};
use crate::host::{ButtonId, GridSize, Host};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Launch parameters handed to the plugin by the host application.
#[derive(Debug, Clone)]
pub struct Registration {
    pub port: u16,
    pub plugin_uuid: String,
    pub register_event: String,
    pub info: RegistrationInfo,
}

/// Cheap, clonable [`Host`] implementation that queues frames for the
/// connection's writer.
#[derive(Clone)]
pub struct HostHandle {
    plugin_uuid: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl HostHandle {
    fn send(&self, frame: Outbound) {
        if self.tx.send(frame).is_err() {
            debug!("host link closed, dropping outbound frame");
        }
    }
}

impl Host for HostHandle {
    fn set_title(&self, button: &ButtonId, title: &str) {
        self.send(Outbound::SetTitle {
            context: button.0.clone(),
            payload: TitlePayload {
                title: title.to_string(),
                target: 0,
            },
        });
    }

    fn set_image(&self, button: &ButtonId, image: &str) {
        self.send(Outbound::SetImage {
            context: button.0.clone(),
            payload: ImagePayload {
                image: image.to_string(),
                target: 0,
            },
        });
    }

    fn switch_to_profile(&self, device: &str, profile: Option<&str>) {
        self.send(Outbound::SwitchToProfile {
            context: self.plugin_uuid.clone(),
            device: device.to_string(),
            payload: ProfilePayload {
                profile: profile.map(ToString::to_string),
            },
        });
    }

    fn set_settings(&self, button: &ButtonId, settings: &serde_json::Value) {
        self.send(Outbound::SetSettings {
            context: button.0.clone(),
            payload: settings.clone(),
        });
    }

    fn request_global_settings(&self) {
        self.send(Outbound::GetGlobalSettings {
            context: self.plugin_uuid.clone(),
        });
    }

    fn set_global_settings(&self, settings: &serde_json::Value) {
        self.send(Outbound::SetGlobalSettings {
            context: self.plugin_uuid.clone(),
            payload: settings.clone(),
        });
    }

    fn open_url(&self, url: &str) {
        self.send(Outbound::OpenUrl {
            payload: UrlPayload {
                url: url.to_string(),
            },
        });
    }
}

/// Open the host socket, register, and spawn the I/O task.
///
/// Host events are forwarded into `events`; when the host goes away
/// `PluginEvent::HostClosed` is sent and the task ends.
///
/// # Errors
/// Returns `DeckError::Host` if the socket cannot be opened or the
/// registration frame cannot be sent.
pub async fn connect(
    registration: &Registration,
    events: mpsc::UnboundedSender<PluginEvent>,
    cancel: CancellationToken,
) -> Result<(HostHandle, tokio::task::JoinHandle<()>)> {
    let url = format!("ws://127.0.0.1:{}", registration.port);
    info!("connecting to host at {url}");

    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| DeckError::Host(format!("connect {url}: {e}")))?;
    let (mut sink, stream) = ws.split();

    let register = serde_json::to_string(&RegisterFrame {
        event: &registration.register_event,
        uuid: &registration.plugin_uuid,
    })?;
    sink.send(WsMessage::Text(register.into()))
        .await
        .map_err(|e| DeckError::Host(format!("register: {e}")))?;
    info!("registered plugin {}", registration.plugin_uuid);

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = HostHandle {
        plugin_uuid: registration.plugin_uuid.clone(),
        tx,
    };

    let grids = registration.info.grids();
    let task = tokio::spawn(run_io(sink, stream, rx, events, grids, cancel));

    Ok((handle, task))
}

async fn run_io<S, R>(
    mut sink: S,
    mut stream: R,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<PluginEvent>,
    mut grids: HashMap<String, GridSize>,
    cancel: CancellationToken,
) where
    S: futures::Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
    R: futures::Stream<Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                return;
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else { return };
                match serde_json::to_string(&frame) {
                    Ok(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                            warn!("host write failed: {e}");
                            break;
                        }
                    }
                    Err(e) => warn!("failed to encode {frame:?}: {e}"),
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_text(text.as_str(), &mut grids, &events);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("host closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("host read failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(PluginEvent::HostClosed);
}

fn handle_text(
    text: &str,
    grids: &mut HashMap<String, GridSize>,
    events: &mpsc::UnboundedSender<PluginEvent>,
) {
    let frame: Inbound = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("malformed host frame: {e}");
            return;
        }
    };

    if let Some(event) = protocol::to_event(frame, grids) {
        debug!("host event: {event:?}");
        let _ = events.send(PluginEvent::Host(event));
    }
}
