//! Standalone keys that show a single reading from the companion service:
//! server population, the in-game clock, the day/night phase and the
//! paired server (which doubles as a join button).

pub mod board;

use crate::config::store::Settings;
use crate::error::{ErrorKind, Result};
use crate::gateway::model::{Population, ServerListing, ServerTime};
use crate::gateway::Gateway;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

pub const SERVER_INFO_ACTION: &str = "com.aurum.rust-deck.server-info";
pub const TIME_ACTION: &str = "com.aurum.rust-deck.time";
pub const PHASE_ACTION: &str = "com.aurum.rust-deck.phase-of-day";
pub const JOIN_SERVER_ACTION: &str = "com.aurum.rust-deck.join-server";

/// Steam app id of the game.
const GAME_APP_ID: u32 = 252_490;

const DEFAULT_POPULATION_PATH: &str = "/pop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    ServerInfo,
    Time,
    Phase,
    JoinServer,
}

impl TileKind {
    #[must_use]
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            SERVER_INFO_ACTION => Some(Self::ServerInfo),
            TIME_ACTION => Some(Self::Time),
            PHASE_ACTION => Some(Self::Phase),
            JOIN_SERVER_ACTION => Some(Self::JoinServer),
            _ => None,
        }
    }

    /// Poll period in seconds when the key names none. `None` for tiles
    /// that only read on appear and on press.
    const fn default_period_secs(self) -> Option<u64> {
        match self {
            Self::ServerInfo | Self::Phase => Some(30),
            Self::JoinServer => Some(5),
            Self::Time => None,
        }
    }

    /// Settings a freshly placed key is given.
    const fn defaults(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::ServerInfo => &[
                ("serverPath", DEFAULT_POPULATION_PATH),
                ("updateInterval", "30"),
            ],
            Self::Phase => &[("titlePosition", "top"), ("updateInterval", "30")],
            Self::JoinServer => &[("serverEndpoint", ""), ("updateInterval", "5")],
            Self::Time => &[],
        }
    }
}

/// Where a phase tile puts its custom title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TitlePosition {
    #[default]
    Top,
    Bottom,
}

/// Per-key options, read from the key's own settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOptions {
    /// `None` reads only on appear and on press.
    pub period: Option<Duration>,
    pub population_path: String,
    pub custom_title: Option<String>,
    pub title_position: TitlePosition,
}

impl TileOptions {
    #[must_use]
    pub fn from_settings(kind: TileKind, settings: &Value) -> Self {
        let text = |key: &str| {
            settings
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let period = kind.default_period_secs().and_then(|default| {
            match settings.get("updateInterval") {
                None | Some(Value::Null) => Some(default),
                Some(raw) => match parse_seconds(raw) {
                    Some(secs) if secs > 0 => Some(secs),
                    _ => {
                        warn!("invalid update interval {raw}, reading on press only");
                        None
                    }
                },
            }
        });

        Self {
            period: period.map(Duration::from_secs),
            population_path: text("serverPath")
                .unwrap_or(DEFAULT_POPULATION_PATH)
                .to_string(),
            custom_title: text("customTitle").map(ToString::to_string),
            title_position: match text("titlePosition") {
                Some("bottom") => TitlePosition::Bottom,
                _ => TitlePosition::Top,
            },
        }
    }
}

/// Interval settings arrive as numbers or numeric strings.
fn parse_seconds(raw: &Value) -> Option<u64> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `settings` with the kind's defaults filled in, or `None` if nothing
/// was missing.
#[must_use]
pub fn with_defaults(kind: TileKind, settings: &Value) -> Option<Value> {
    let mut map = settings.as_object().cloned().unwrap_or_default();
    let mut changed = false;

    for (key, value) in kind.defaults() {
        let missing = match map.get(*key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty() && !value.is_empty(),
            Some(_) => false,
        };
        if missing {
            map.insert((*key).to_string(), Value::from(*value));
            changed = true;
        }
    }

    changed.then_some(Value::Object(map))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileReading {
    Population(Population),
    Time(ServerTime),
    Server(ServerListing),
}

/// Read what a tile of `kind` shows.
///
/// # Errors
/// Propagates the gateway error; the caller turns it into a key title.
pub async fn read(
    gateway: &dyn Gateway,
    settings: &Settings,
    kind: TileKind,
    options: &TileOptions,
) -> Result<TileReading> {
    let base = settings.base_url.as_deref();
    match kind {
        TileKind::ServerInfo => gateway
            .population(base, &options.population_path)
            .await
            .map(TileReading::Population),
        TileKind::Time | TileKind::Phase => {
            gateway.server_time(base).await.map(TileReading::Time)
        }
        TileKind::JoinServer => gateway.active_server(base).await.map(TileReading::Server),
    }
}

/// Key title for a finished read.
#[must_use]
pub fn title_for(kind: TileKind, options: &TileOptions, reading: &Result<TileReading>) -> String {
    let reading = match reading {
        Ok(reading) => reading,
        Err(e) => return failure_title(kind, e.kind()).to_string(),
    };

    match (kind, reading) {
        (TileKind::ServerInfo, TileReading::Population(pop)) => population_title(pop),
        (TileKind::Time, TileReading::Time(time)) => time
            .server_time
            .clone()
            .unwrap_or_else(|| "Invalid".to_string()),
        (TileKind::Phase, TileReading::Time(time)) => phase_text(time).map_or_else(
            || "Invalid".to_string(),
            |phase| with_custom_title(options, &phase),
        ),
        (TileKind::JoinServer, TileReading::Server(listing)) => match &listing.server {
            None => "No Server".to_string(),
            Some(details) => details
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "No Title".to_string()),
        },
        _ => "Invalid".to_string(),
    }
}

const fn failure_title(kind: TileKind, error: ErrorKind) -> &'static str {
    match (kind, error) {
        (TileKind::ServerInfo, _) => "Error",
        (_, ErrorKind::Config) => "No URL",
        (_, ErrorKind::Decode) => "Parse Error",
        (TileKind::JoinServer, _) => "Fetch Error",
        _ => "Error",
    }
}

fn population_title(pop: &Population) -> String {
    let mut title = format!("{}/{}", pop.current_players, pop.max_players);
    if pop.queued_players > 0 {
        title.push_str(&format!("({})", pop.queued_players));
    }
    title
}

/// Icon of the coming phase followed by the countdown to it.
fn phase_text(time: &ServerTime) -> Option<String> {
    let is_day = time.is_day?;
    let icon = if is_day { "🌙" } else { "☀️" };
    Some(format!("{icon}{}", time.time_till_change.as_deref()?))
}

fn with_custom_title(options: &TileOptions, phase: &str) -> String {
    match (&options.custom_title, options.title_position) {
        (None, _) => phase.to_string(),
        (Some(title), TitlePosition::Top) => format!("{title}\n{phase}"),
        (Some(title), TitlePosition::Bottom) => format!("{phase}\n{title}"),
    }
}

/// Text persisted as the key's `lastUpdate` after a good read.
#[must_use]
pub fn last_update(kind: TileKind, reading: &TileReading) -> Option<String> {
    match (kind, reading) {
        (TileKind::Time, TileReading::Time(time)) => time.server_time.clone(),
        (TileKind::Phase, TileReading::Time(time)) => phase_text(time),
        _ => None,
    }
}

/// Launch link that starts the game connected to `address`.
#[must_use]
pub fn join_url(address: &str) -> String {
    format!("steam://run/{GAME_APP_ID}//+connect {address}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;
    use crate::gateway::model::ServerDetails;
    use serde_json::json;

    fn options(kind: TileKind, settings: Value) -> TileOptions {
        TileOptions::from_settings(kind, &settings)
    }

    #[test]
    fn interval_accepts_numbers_and_strings() {
        let kind = TileKind::ServerInfo;
        assert_eq!(options(kind, json!({})).period, Some(Duration::from_secs(30)));
        assert_eq!(
            options(kind, json!({"updateInterval": "10"})).period,
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            options(kind, json!({"updateInterval": 15})).period,
            Some(Duration::from_secs(15))
        );
        assert_eq!(options(kind, json!({"updateInterval": "0"})).period, None);
        assert_eq!(options(kind, json!({"updateInterval": "soon"})).period, None);
    }

    #[test]
    fn clock_tile_never_polls() {
        let opts = options(TileKind::Time, json!({"updateInterval": "5"}));
        assert_eq!(opts.period, None);
    }

    #[test]
    fn defaults_only_fill_gaps() {
        let merged = with_defaults(TileKind::Phase, &json!({"updateInterval": "60"})).unwrap();
        assert_eq!(merged, json!({"updateInterval": "60", "titlePosition": "top"}));

        let complete = json!({"titlePosition": "bottom", "updateInterval": "60"});
        assert_eq!(with_defaults(TileKind::Phase, &complete), None);
        assert_eq!(with_defaults(TileKind::Time, &Value::Null), None);

        // An empty endpoint is a legitimate value for the join tile.
        let join = json!({"serverEndpoint": "", "updateInterval": "5"});
        assert_eq!(with_defaults(TileKind::JoinServer, &join), None);
    }

    #[test]
    fn population_titles() {
        let opts = options(TileKind::ServerInfo, json!({}));
        let pop = |current, queued| {
            Ok(TileReading::Population(Population {
                current_players: current,
                max_players: 200,
                queued_players: queued,
            }))
        };
        assert_eq!(title_for(TileKind::ServerInfo, &opts, &pop(87, 0)), "87/200");
        assert_eq!(title_for(TileKind::ServerInfo, &opts, &pop(200, 14)), "200/200(14)");

        let err = Err(DeckError::Config("base URL not configured".into()));
        assert_eq!(title_for(TileKind::ServerInfo, &opts, &err), "Error");
    }

    #[test]
    fn phase_titles() {
        let time = |is_day| {
            Ok(TileReading::Time(ServerTime {
                server_time: Some("08:00".into()),
                is_day: Some(is_day),
                time_till_change: Some("41m".into()),
            }))
        };

        let plain = options(TileKind::Phase, json!({}));
        assert_eq!(title_for(TileKind::Phase, &plain, &time(true)), "🌙41m");
        assert_eq!(title_for(TileKind::Phase, &plain, &time(false)), "☀️41m");

        let below = options(
            TileKind::Phase,
            json!({"customTitle": "Night in", "titlePosition": "bottom"}),
        );
        assert_eq!(title_for(TileKind::Phase, &below, &time(true)), "🌙41m\nNight in");

        let above = options(TileKind::Phase, json!({"customTitle": "Night in"}));
        assert_eq!(title_for(TileKind::Phase, &above, &time(true)), "Night in\n🌙41m");

        let partial = Ok(TileReading::Time(ServerTime::default()));
        assert_eq!(title_for(TileKind::Phase, &plain, &partial), "Invalid");
        assert_eq!(title_for(TileKind::Time, &plain, &partial), "Invalid");
    }

    #[test]
    fn failure_titles_by_kind() {
        let opts = options(TileKind::Time, json!({}));
        let decode = Err(DeckError::Decode("not json".into()));
        let transport = Err(DeckError::Transport("refused".into()));
        let config = Err(DeckError::Config("base URL not configured".into()));

        assert_eq!(title_for(TileKind::Time, &opts, &decode), "Parse Error");
        assert_eq!(title_for(TileKind::Time, &opts, &transport), "Error");
        assert_eq!(title_for(TileKind::Phase, &opts, &config), "No URL");
        assert_eq!(title_for(TileKind::JoinServer, &opts, &transport), "Fetch Error");
    }

    #[test]
    fn join_titles() {
        let opts = options(TileKind::JoinServer, json!({}));
        let listing = |details: Option<ServerDetails>| {
            Ok(TileReading::Server(ServerListing {
                active_server: None,
                server: details,
            }))
        };

        assert_eq!(title_for(TileKind::JoinServer, &opts, &listing(None)), "No Server");
        assert_eq!(
            title_for(TileKind::JoinServer, &opts, &listing(Some(ServerDetails::default()))),
            "No Title"
        );
        let named = ServerDetails {
            title: Some("Rustoria Main".into()),
            connect: None,
        };
        assert_eq!(
            title_for(TileKind::JoinServer, &opts, &listing(Some(named))),
            "Rustoria Main"
        );
    }

    #[test]
    fn join_link() {
        assert_eq!(
            join_url("10.0.0.1:28015"),
            "steam://run/252490//+connect 10.0.0.1:28015"
        );
    }
}
