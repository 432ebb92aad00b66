use crate::action::launcher::{self, BACK_ACTION, DEFAULT_PROFILE, PROFILE_ACTION};
use crate::config::schema::{GlobalSettings, PluginConfig};
use crate::config::store::SettingsStore;
use crate::error::Result;
use crate::event::PluginEvent;
use crate::gateway::{Gateway, HttpGateway};
use crate::host::connection::{self, Registration};
use crate::host::{Host, HostEvent};
use crate::page::engine::ProfileEngine;
use crate::stream::{StreamClient, DEVICE_TOPICS};
use crate::tile::board::TileBoard;
use crate::tile::TileKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run the plugin until the host goes away or the process is interrupted.
///
/// # Errors
/// Returns `DeckError` if the host link or HTTP client cannot be set up.
pub async fn run(config: PluginConfig, registration: Registration) -> Result<()> {
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<PluginEvent>();

    let (host, host_task) = connection::connect(&registration, tx.clone(), cancel.clone()).await?;
    let host: Arc<dyn Host> = Arc::new(host);
    host.request_global_settings();

    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(Duration::from_millis(
        config.plugin.request_timeout_ms,
    ))?);

    let stream = config
        .stream
        .enabled
        .then(|| StreamClient::new(config.stream.clone()));
    let forwarder = stream.as_ref().map(|client| {
        client.connect();
        spawn_stream_forwarder(client, &tx, &cancel)
    });

    let period = Duration::from_millis(config.plugin.refresh_interval_ms);
    let mut plugin = Plugin::new(host, gateway, tx, &config);
    let mut ticker: Option<Interval> = None;

    info!(
        "rustdeck running, refresh every {period:?}, event stream {}",
        if stream.is_some() { "on" } else { "off" }
    );

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            () = async { tokio::signal::ctrl_c().await.ok(); } => {
                info!("received SIGINT, shutting down");
                break;
            }
            () = next_tick(&mut ticker) => {
                plugin.engine.refresh();
                continue;
            }
            event = rx.recv() => match event {
                Some(e) => e,
                None => break,
            },
        };

        if plugin.handle_event(event) {
            break;
        }
        sync_ticker(&mut ticker, plugin.engine.is_visible(), period);
    }

    info!("plugin shutting down...");
    cancel.cancel();
    if let Some(client) = &stream {
        client.disconnect().await;
    }

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = host_task.await;
        if let Some(forwarder) = forwarder {
            let _ = forwarder.await;
        }
    })
    .await;

    info!("plugin stopped");
    Ok(())
}

/// Resolves on the next refresh tick, or never while no ticker runs.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Keep a refresh ticker alive exactly while the profile is on screen.
fn sync_ticker(ticker: &mut Option<Interval>, visible: bool, period: Duration) {
    match (visible, ticker.is_some()) {
        (true, false) => {
            debug!("starting refresh ticker");
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *ticker = Some(interval);
        }
        (false, true) => {
            debug!("stopping refresh ticker");
            *ticker = None;
        }
        _ => {}
    }
}

fn spawn_stream_forwarder(
    client: &StreamClient,
    tx: &mpsc::UnboundedSender<PluginEvent>,
    cancel: &CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut subscription = client.subscribe_topics(&DEVICE_TOPICS);
    let tx = tx.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(event) => {
                        if tx.send(PluginEvent::Stream(event)).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("stream forwarder exiting");
    })
}

/// Event-loop state: routes host events to the launcher actions, the tiles
/// or the profile engine.
struct Plugin {
    host: Arc<dyn Host>,
    store: SettingsStore,
    engine: ProfileEngine,
    tiles: TileBoard,
    profile_name: String,
    default_base_url: String,
    global_seen: bool,
}

impl Plugin {
    fn new(
        host: Arc<dyn Host>,
        gateway: Arc<dyn Gateway>,
        events: mpsc::UnboundedSender<PluginEvent>,
        config: &PluginConfig,
    ) -> Self {
        let store = SettingsStore::new();
        let tiles = TileBoard::new(
            Arc::clone(&host),
            Arc::clone(&gateway),
            events.clone(),
            store.snapshot(),
        );
        let engine = ProfileEngine::new(
            Arc::clone(&host),
            gateway,
            events,
            store.snapshot(),
            config.plugin.page_capacity,
        );
        Self {
            host,
            store,
            engine,
            tiles,
            profile_name: config.plugin.profile_name.clone(),
            default_base_url: config.plugin.base_url.clone(),
            global_seen: false,
        }
    }

    /// Handle a single event. Returns `true` if the plugin should stop.
    fn handle_event(&mut self, event: PluginEvent) -> bool {
        match event {
            PluginEvent::Host(host_event) => self.handle_host(host_event),

            PluginEvent::Fetched {
                generation,
                outcome,
            } => self.engine.apply_fetch(generation, outcome),

            PluginEvent::HoldElapsed { button, session } => {
                self.engine.hold_elapsed(&button, session);
            }

            PluginEvent::CommandSettled(report) => self.engine.command_settled(report),

            PluginEvent::Stream(event) => self.engine.apply_stream(&event),

            PluginEvent::TileDue { button, session } => self.tiles.due(&button, session),

            PluginEvent::TileRead {
                button,
                session,
                reading,
            } => self.tiles.read_finished(&button, session, reading),

            PluginEvent::HostClosed => {
                info!("host link closed");
                return true;
            }

            PluginEvent::Shutdown => {
                info!("shutdown event received");
                return true;
            }
        }

        false
    }

    fn handle_host(&mut self, event: HostEvent) {
        match event {
            HostEvent::WillAppear {
                action,
                button,
                placement,
                ..
            } if action == PROFILE_ACTION => self.engine.button_appeared(button, placement),

            HostEvent::WillAppear {
                action,
                button,
                settings,
                ..
            } => match TileKind::from_action(&action) {
                Some(kind) => self.tiles.appeared(kind, button, settings),
                None => debug!("{action} appeared on {button}"),
            },

            HostEvent::WillDisappear { action, button } => {
                if action == PROFILE_ACTION {
                    self.engine.button_disappeared(&button);
                } else {
                    self.tiles.disappeared(&button);
                }
            }

            HostEvent::SettingsChanged {
                button, settings, ..
            } => self.tiles.settings_changed(&button, settings),

            HostEvent::KeyDown {
                action,
                button,
                placement,
                settings,
            } => {
                if action == PROFILE_ACTION {
                    self.engine.key_down(button, placement);
                } else if self.tiles.contains(&button) {
                    self.tiles.key_down(&button);
                } else if action == BACK_ACTION {
                    self.host
                        .switch_to_profile(&placement.device, Some(DEFAULT_PROFILE));
                } else if let Some(kind) = launcher::launcher_kind(&action) {
                    match launcher::launch(
                        self.host.as_ref(),
                        &self.store,
                        kind,
                        &self.profile_name,
                        &button,
                        &placement.device,
                        &settings,
                    ) {
                        Ok(applied) => self.engine.settings_changed(applied),
                        Err(e) => error!("launcher {action} failed: {e}"),
                    }
                } else {
                    debug!("key down on unknown action {action}");
                }
            }

            HostEvent::KeyUp { action, button } if action == PROFILE_ACTION => {
                self.engine.key_up(&button);
            }

            HostEvent::GlobalSettings(value) => self.global_settings_received(value),

            HostEvent::DeviceConnected { device, grid } => {
                info!("device {device} connected ({grid:?})");
                self.engine.device_connected(&device, grid);
            }

            HostEvent::DeviceDisconnected { device } => info!("device {device} disconnected"),

            other => debug!("ignoring {other:?}"),
        }
    }

    fn global_settings_received(&mut self, value: serde_json::Value) {
        let mut global: GlobalSettings = if value.is_null() {
            GlobalSettings::default()
        } else {
            match serde_json::from_value(value) {
                Ok(global) => global,
                Err(e) => {
                    warn!("ignoring malformed global settings: {e}");
                    return;
                }
            }
        };

        let first = !self.global_seen;
        self.global_seen = true;

        let missing_url = global
            .base_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty());
        if first && missing_url {
            info!("no base URL stored, seeding {}", self.default_base_url);
            global.base_url = Some(self.default_base_url.clone());
            match serde_json::to_value(&global) {
                Ok(value) => self.host.set_global_settings(&value),
                Err(e) => warn!("failed to encode global settings: {e}"),
            }
        }

        let settings = self.store.apply(global);
        self.tiles.global_changed(Arc::clone(&settings));
        self.engine.settings_changed(settings);
    }
}
