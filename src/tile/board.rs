use super::{join_url, last_update, read, title_for, with_defaults, TileKind, TileOptions, TileReading};
use crate::config::store::Settings;
use crate::error::Result;
use crate::event::PluginEvent;
use crate::gateway::model::ServerDetails;
use crate::gateway::Gateway;
use crate::host::{ButtonId, Host};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

struct Tile {
    kind: TileKind,
    options: TileOptions,
    /// Last known key settings; `lastUpdate` is merged into these.
    settings: Value,
    session: u64,
    poller: Option<JoinHandle<()>>,
    /// From the last good listing.
    join_address: Option<String>,
}

impl Tile {
    fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }

    /// Start a fresh session; results of older ones are ignored.
    fn restart(
        &mut self,
        button: &ButtonId,
        session: u64,
        events: &mpsc::UnboundedSender<PluginEvent>,
    ) {
        self.stop();
        self.session = session;
        self.poller = self
            .options
            .period
            .map(|period| spawn_poller(button.clone(), session, period, events.clone()));
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_poller(
    button: ButtonId,
    session: u64,
    period: Duration,
    events: mpsc::UnboundedSender<PluginEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let due = PluginEvent::TileDue {
                button: button.clone(),
                session,
            };
            if events.send(due).is_err() {
                break;
            }
        }
    })
}

/// Every visible tile key, each with its own poll timer.
pub struct TileBoard {
    host: Arc<dyn Host>,
    gateway: Arc<dyn Gateway>,
    events: mpsc::UnboundedSender<PluginEvent>,
    settings: Arc<Settings>,
    tiles: HashMap<ButtonId, Tile>,
    next_session: u64,
}

impl TileBoard {
    pub fn new(
        host: Arc<dyn Host>,
        gateway: Arc<dyn Gateway>,
        events: mpsc::UnboundedSender<PluginEvent>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            host,
            gateway,
            events,
            settings,
            tiles: HashMap::new(),
            next_session: 0,
        }
    }

    #[must_use]
    pub fn contains(&self, button: &ButtonId) -> bool {
        self.tiles.contains_key(button)
    }

    pub fn appeared(&mut self, kind: TileKind, button: ButtonId, settings: Value) {
        let settings = match with_defaults(kind, &settings) {
            Some(merged) => {
                self.host.set_settings(&button, &merged);
                merged
            }
            None => settings,
        };

        let options = TileOptions::from_settings(kind, &settings);
        info!("{kind:?} tile on {button}, polling every {:?}", options.period);

        let mut tile = Tile {
            kind,
            options,
            settings,
            session: 0,
            poller: None,
            join_address: None,
        };
        self.next_session += 1;
        tile.restart(&button, self.next_session, &self.events);
        self.tiles.insert(button.clone(), tile);
        self.read_now(&button);
    }

    pub fn disappeared(&mut self, button: &ButtonId) {
        if let Some(tile) = self.tiles.remove(button) {
            debug!("{:?} tile on {button} gone", tile.kind);
        }
    }

    /// New settings for one key. Polling restarts only if an option that
    /// affects it changed.
    pub fn settings_changed(&mut self, button: &ButtonId, settings: Value) {
        let Some(tile) = self.tiles.get_mut(button) else {
            return;
        };

        let options = TileOptions::from_settings(tile.kind, &settings);
        tile.settings = settings;
        if options == tile.options {
            return;
        }

        debug!("{:?} tile on {button} reconfigured: {options:?}", tile.kind);
        tile.options = options;
        self.next_session += 1;
        tile.restart(button, self.next_session, &self.events);
        self.read_now(button);
    }

    pub fn global_changed(&mut self, settings: Arc<Settings>) {
        let url_changed = settings.base_url != self.settings.base_url;
        self.settings = settings;
        if url_changed {
            for button in self.tiles.keys() {
                self.read_now(button);
            }
        }
    }

    pub fn key_down(&self, button: &ButtonId) {
        let Some(tile) = self.tiles.get(button) else {
            return;
        };

        if tile.kind == TileKind::JoinServer {
            match &tile.join_address {
                Some(address) => {
                    info!("joining {address}");
                    self.host.open_url(&join_url(address));
                }
                None => warn!("no server address known yet"),
            }
        }

        self.read_now(button);
    }

    pub fn due(&self, button: &ButtonId, session: u64) {
        match self.tiles.get(button) {
            Some(tile) if tile.session == session => self.read_now(button),
            _ => debug!("dropping stale poll for {button}"),
        }
    }

    fn read_now(&self, button: &ButtonId) {
        let Some(tile) = self.tiles.get(button) else {
            return;
        };

        let gateway = Arc::clone(&self.gateway);
        let settings = Arc::clone(&self.settings);
        let events = self.events.clone();
        let kind = tile.kind;
        let options = tile.options.clone();
        let session = tile.session;
        let button = button.clone();
        tokio::spawn(async move {
            let reading = read(gateway.as_ref(), &settings, kind, &options).await;
            let _ = events.send(PluginEvent::TileRead {
                button,
                session,
                reading,
            });
        });
    }

    pub fn read_finished(&mut self, button: &ButtonId, session: u64, reading: Result<TileReading>) {
        let Some(tile) = self.tiles.get_mut(button) else {
            return;
        };
        if tile.session != session {
            debug!("dropping stale read for {button}");
            return;
        }

        if let Err(e) = &reading {
            warn!("{:?} tile read failed: {e}", tile.kind);
        }
        let title = title_for(tile.kind, &tile.options, &reading);

        if let Ok(reading) = &reading {
            if let TileReading::Server(listing) = reading {
                tile.join_address = listing
                    .server
                    .as_ref()
                    .and_then(ServerDetails::connect_address)
                    .map(ToString::to_string);
            }

            if let Some(stamp) = last_update(tile.kind, reading) {
                let mut map = tile.settings.as_object().cloned().unwrap_or_default();
                map.insert("lastUpdate".to_string(), Value::from(stamp));
                tile.settings = Value::Object(map);
                self.host.set_settings(button, &tile.settings);
            }
        }

        self.host.set_title(button, &title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::fake::FakeGateway;
    use crate::gateway::model::{Population, ServerListing, ServerTime};
    use crate::host::recording::RecordingHost;
    use serde_json::json;

    struct Rig {
        board: TileBoard,
        host: Arc<RecordingHost>,
        gateway: Arc<FakeGateway>,
        rx: mpsc::UnboundedReceiver<PluginEvent>,
    }

    fn rig(base_url: Option<&str>) -> Rig {
        let host = Arc::new(RecordingHost::default());
        let gateway = Arc::new(FakeGateway::default());
        {
            let mut state = gateway.state.lock().unwrap();
            state.population = Some(Population {
                current_players: 87,
                max_players: 200,
                queued_players: 3,
            });
            state.time = Some(ServerTime {
                server_time: Some("13:37".into()),
                is_day: Some(false),
                time_till_change: Some("4m".into()),
            });
        }
        let settings = Arc::new(Settings {
            base_url: base_url.map(ToString::to_string),
            ..Settings::default()
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let board = TileBoard::new(host.clone(), gateway.clone(), tx, settings);
        Rig {
            board,
            host,
            gateway,
            rx,
        }
    }

    fn key(name: &str) -> ButtonId {
        ButtonId(name.to_string())
    }

    impl Rig {
        async fn pump_for(&mut self, window: Duration) {
            let deadline = Instant::now() + window;
            while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
                match event {
                    PluginEvent::TileDue { button, session } => self.board.due(&button, session),
                    PluginEvent::TileRead {
                        button,
                        session,
                        reading,
                    } => self.board.read_finished(&button, session, reading),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }

        async fn pump(&mut self) {
            self.pump_for(Duration::from_millis(1)).await;
        }

        fn fetches(&self) -> usize {
            self.gateway.state.lock().unwrap().fetches
        }
    }

    #[tokio::test(start_paused = true)]
    async fn server_info_polls_on_its_period() {
        let mut rig = rig(Some("http://fake"));
        rig.board
            .appeared(TileKind::ServerInfo, key("pop"), json!({"updateInterval": "10"}));
        rig.pump().await;

        assert_eq!(rig.host.title("pop").as_deref(), Some("87/200(3)"));
        assert_eq!(
            rig.host.snapshot().settings[&key("pop")],
            json!({"updateInterval": "10", "serverPath": "/pop"})
        );
        assert_eq!(rig.fetches(), 1);

        rig.pump_for(Duration::from_secs(25)).await;
        assert_eq!(rig.fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disappearing_stops_polling() {
        let mut rig = rig(Some("http://fake"));
        rig.board.appeared(TileKind::JoinServer, key("join"), json!({}));
        rig.pump().await;
        rig.board.disappeared(&key("join"));
        assert!(!rig.board.contains(&key("join")));

        let fetches = rig.fetches();
        rig.pump_for(Duration::from_secs(30)).await;
        assert_eq!(rig.fetches(), fetches);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_reads_on_appear_and_press_only() {
        let mut rig = rig(Some("http://fake"));
        rig.board.appeared(TileKind::Time, key("clock"), json!({}));
        rig.pump_for(Duration::from_secs(120)).await;

        assert_eq!(rig.fetches(), 1);
        assert_eq!(rig.host.title("clock").as_deref(), Some("13:37"));
        assert_eq!(
            rig.host.snapshot().settings[&key("clock")],
            json!({"lastUpdate": "13:37"})
        );

        rig.board.key_down(&key("clock"));
        rig.pump().await;
        assert_eq!(rig.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_keeps_custom_title_and_records_last_update() {
        let mut rig = rig(Some("http://fake"));
        rig.board.appeared(
            TileKind::Phase,
            key("phase"),
            json!({"customTitle": "Day in", "titlePosition": "bottom", "updateInterval": "30"}),
        );
        rig.pump().await;

        assert_eq!(rig.host.title("phase").as_deref(), Some("☀️4m\nDay in"));
        assert_eq!(rig.host.snapshot().settings[&key("phase")]["lastUpdate"], "☀️4m");
        assert_eq!(rig.host.snapshot().settings[&key("phase")]["customTitle"], "Day in");
    }

    #[tokio::test(start_paused = true)]
    async fn join_key_opens_game_once_address_is_known() {
        let mut rig = rig(Some("http://fake"));
        rig.board.appeared(TileKind::JoinServer, key("join"), json!({}));
        rig.board.key_down(&key("join"));
        assert!(rig.host.snapshot().opened_urls.is_empty());
        rig.pump().await;
        assert_eq!(rig.host.title("join").as_deref(), Some("No Server"));

        rig.gateway.state.lock().unwrap().server = ServerListing {
            active_server: Some("main".into()),
            server: Some(ServerDetails {
                title: Some("Rustoria Main".into()),
                connect: Some("connect 10.0.0.1:28015".into()),
            }),
        };
        rig.pump_for(Duration::from_secs(6)).await;
        assert_eq!(rig.host.title("join").as_deref(), Some("Rustoria Main"));

        rig.board.key_down(&key("join"));
        assert_eq!(
            rig.host.snapshot().opened_urls,
            vec!["steam://run/252490//+connect 10.0.0.1:28015".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failures_show_per_kind_labels() {
        let mut rig = rig(Some("http://fake"));
        rig.gateway.state.lock().unwrap().fail_fetch = Some(ErrorKind::Transport);
        rig.board.appeared(TileKind::ServerInfo, key("pop"), json!({}));
        rig.board.appeared(TileKind::JoinServer, key("join"), json!({}));
        rig.pump().await;

        assert_eq!(rig.host.title("pop").as_deref(), Some("Error"));
        assert_eq!(rig.host.title("join").as_deref(), Some("Fetch Error"));

        let mut unconfigured = self::rig(None);
        unconfigured.board.appeared(TileKind::Time, key("clock"), json!({}));
        unconfigured.pump().await;
        assert_eq!(unconfigured.host.title("clock").as_deref(), Some("No URL"));
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_drops_reads_from_old_session() {
        let mut rig = rig(Some("http://fake"));
        rig.board.appeared(TileKind::ServerInfo, key("pop"), json!({}));
        rig.board
            .settings_changed(&key("pop"), json!({"serverPath": "/pop", "updateInterval": "60"}));
        rig.pump().await;

        // Both reads ran, but only the second session's result is applied.
        assert_eq!(rig.fetches(), 2);
        assert_eq!(rig.host.title("pop").as_deref(), Some("87/200(3)"));

        rig.pump_for(Duration::from_secs(45)).await;
        assert_eq!(rig.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_options_do_not_restart() {
        let mut rig = rig(Some("http://fake"));
        rig.board.appeared(TileKind::Time, key("clock"), json!({}));
        rig.pump().await;

        rig.board
            .settings_changed(&key("clock"), json!({"lastUpdate": "13:37"}));
        rig.pump().await;
        assert_eq!(rig.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_base_url_rereads_every_tile() {
        let mut rig = rig(None);
        rig.board.appeared(TileKind::Time, key("clock"), json!({}));
        rig.pump().await;
        assert_eq!(rig.host.title("clock").as_deref(), Some("No URL"));

        rig.board.global_changed(Arc::new(Settings {
            base_url: Some("http://fake".into()),
            ..Settings::default()
        }));
        rig.pump().await;
        assert_eq!(rig.host.title("clock").as_deref(), Some("13:37"));
    }
}
