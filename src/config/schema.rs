use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root of the plugin defaults file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub plugin: PluginSection,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Polling and layout defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSection {
    /// Seeded into the host's global settings when they carry no `baseUrl`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Milliseconds between background refreshes while the profile is visible.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Buttons per page until a device grid is known.
    #[serde(default = "default_page_capacity")]
    pub page_capacity: usize,

    /// Profile the launcher actions switch into.
    #[serde(default = "default_profile_name")]
    pub profile_name: String,
}

impl Default for PluginSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            refresh_interval_ms: default_refresh_interval(),
            request_timeout_ms: default_request_timeout(),
            page_capacity: default_page_capacity(),
            profile_name: default_profile_name(),
        }
    }
}

/// Push channel settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_stream_url")]
    pub url: String,

    #[serde(default = "default_guild_id")]
    pub guild_id: String,

    /// Topics announced in the subscribe frame.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_stream_url(),
            guild_id: default_guild_id(),
            endpoints: default_endpoints(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

/// Which device collections the profile shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    #[default]
    Switches,
    Alarms,
    /// Switches, alarms and groups combined.
    Devices,
    SwitchGroups,
}

impl ProfileKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Switches => "smart_switches",
            Self::Alarms => "smart_alarms",
            Self::Devices => "smart_devices",
            Self::SwitchGroups => "switch_groups",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smart_switches" => Ok(Self::Switches),
            "smart_alarms" => Ok(Self::Alarms),
            "smart_devices" => Ok(Self::Devices),
            "switch_groups" => Ok(Self::SwitchGroups),
            other => Err(format!("unknown profile type: {other}")),
        }
    }
}

/// Global settings as stored by the host application.
///
/// Keys this plugin does not know about are kept in `extra` so that writing
/// the settings back never drops values owned by the property inspector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_switches: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_alarms: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_switches_groups: Option<bool>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// --- Defaults ---

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_refresh_interval() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_page_capacity() -> usize {
    15
}

fn default_profile_name() -> String {
    "profiles/Rustplusplus".to_string()
}

fn default_true() -> bool {
    true
}

fn default_stream_url() -> String {
    "ws://localhost:8074".to_string()
}

fn default_guild_id() -> String {
    "default".to_string()
}

fn default_endpoints() -> Vec<String> {
    ["time", "pop", "switches", "alarms", "switchgroups"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_reconnect_delay() -> u64 {
    5000
}
