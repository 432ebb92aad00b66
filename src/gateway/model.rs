use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::cmp::Ordering;

/// A smart switch as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Switch {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reachable: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    /// Icon file name inside the plugin's icon folders.
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub command: String,
}

/// A smart alarm. Read-only from the deck's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reachable: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    /// Unix seconds of the last trigger, 0 if never.
    #[serde(default, deserialize_with = "lenient_unix_seconds")]
    pub last_trigger: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
}

/// A named set of switches that can be driven together.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchGroup {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Member switch ids, in backend order.
    #[serde(default, rename = "switches", deserialize_with = "null_as_default")]
    pub members: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,
}

/// An explicit `null` decodes as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Whole seconds from an integer, a float (floored), or a numeric string.
/// Anything else reads as 0, i.e. never.
fn lenient_unix_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
        }
        _ => None,
    };
    Ok(seconds.unwrap_or(0))
}

/// Player counts served at the population path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Population {
    pub current_players: u32,
    pub max_players: u32,
    pub queued_players: u32,
}

/// In-game clock served at `/time`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    #[serde(default, rename = "server_time")]
    pub server_time: Option<String>,
    #[serde(default)]
    pub is_day: Option<bool>,
    /// Pre-formatted countdown to the next sunrise or sunset.
    #[serde(default)]
    pub time_till_change: Option<String>,
}

/// The server the companion service is paired with, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerListing {
    #[serde(default)]
    pub active_server: Option<String>,
    #[serde(default)]
    pub server: Option<ServerDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetails {
    #[serde(default)]
    pub title: Option<String>,
    /// Console command, e.g. `connect 1.2.3.4:28015`.
    #[serde(default)]
    pub connect: Option<String>,
}

impl ServerDetails {
    /// The `host:port` part of the connect command.
    #[must_use]
    pub fn connect_address(&self) -> Option<&str> {
        let raw = self.connect.as_deref()?.trim();
        let address = raw.strip_prefix("connect").map_or(raw, str::trim_start);
        (!address.is_empty()).then_some(address)
    }
}

/// One entry of the profile's device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    Switch(Switch),
    Alarm(Alarm),
    Group(SwitchGroup),
}

/// Identifies a device across refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceRef {
    Switch(String),
    Alarm(String),
    Group(String),
}

impl Device {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Switch(s) => &s.id,
            Self::Alarm(a) => &a.id,
            Self::Group(g) => &g.id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Switch(s) => &s.name,
            Self::Alarm(a) => &a.name,
            Self::Group(g) => &g.name,
        }
    }

    #[must_use]
    pub fn reference(&self) -> DeviceRef {
        match self {
            Self::Switch(s) => DeviceRef::Switch(s.id.clone()),
            Self::Alarm(a) => DeviceRef::Alarm(a.id.clone()),
            Self::Group(g) => DeviceRef::Group(g.id.clone()),
        }
    }

    /// Sort priority in the combined listing.
    const fn priority(&self) -> u8 {
        match self {
            Self::Switch(_) => 0,
            Self::Alarm(_) => 1,
            Self::Group(_) => 2,
        }
    }

    /// Order by variant, then case-insensitive name.
    #[must_use]
    pub fn listing_order(&self, other: &Self) -> Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| self.name().to_lowercase().cmp(&other.name().to_lowercase()))
    }

    #[must_use]
    pub fn matches(&self, target: &DeviceRef) -> bool {
        match (self, target) {
            (Self::Switch(s), DeviceRef::Switch(id)) => &s.id == id,
            (Self::Alarm(a), DeviceRef::Alarm(id)) => &a.id == id,
            (Self::Group(g), DeviceRef::Group(id)) => &g.id == id,
            _ => false,
        }
    }
}

/// A collection the backend serves, with the key its envelope uses.
pub trait Collection: serde::de::DeserializeOwned {
    /// Path segment under the base URL.
    const RESOURCE: &'static str;
    /// Top-level key holding the array in the response body.
    const KEY: &'static str;
}

impl Collection for Switch {
    const RESOURCE: &'static str = "switches";
    const KEY: &'static str = "switches";
}

impl Collection for Alarm {
    const RESOURCE: &'static str = "alarms";
    const KEY: &'static str = "alarms";
}

impl Collection for SwitchGroup {
    const RESOURCE: &'static str = "switchgroups";
    const KEY: &'static str = "switchGroups";
}

/// Decode a collection from either its REST envelope or a bare array.
///
/// # Errors
/// Returns `DeckError::Decode` if the value is neither shape or an element
/// does not match the collection's type.
pub fn decode_collection<T: Collection>(value: serde_json::Value) -> crate::error::Result<Vec<T>> {
    use crate::error::DeckError;

    let items = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map.remove(T::KEY).ok_or_else(|| {
            DeckError::Decode(format!("/{} response lacks '{}'", T::RESOURCE, T::KEY))
        })?,
        other => {
            return Err(DeckError::Decode(format!(
                "/{} response is not an object: {other}",
                T::RESOURCE
            )))
        }
    };

    serde_json::from_value(items)
        .map_err(|e| DeckError::Decode(format!("/{} items: {e}", T::RESOURCE)))
}
