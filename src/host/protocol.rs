//! JSON messages exchanged with the Stream Deck application.

use crate::host::{ButtonId, Coordinates, GridSize, HostEvent, KeyPlacement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// First frame sent after the socket opens.
#[derive(Debug, Serialize)]
pub struct RegisterFrame<'a> {
    pub event: &'a str,
    pub uuid: &'a str,
}

/// Frames from the host. Anything unrecognised decodes as `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Inbound {
    WillAppear(ActionFrame),
    WillDisappear(ActionFrame),
    KeyDown(ActionFrame),
    KeyUp(ActionFrame),
    DidReceiveSettings(ActionFrame),
    DidReceiveGlobalSettings {
        payload: GlobalPayload,
    },
    DeviceDidConnect {
        device: String,
        #[serde(rename = "deviceInfo")]
        device_info: Option<DeviceInfo>,
    },
    DeviceDidDisconnect {
        device: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ActionFrame {
    pub action: String,
    pub context: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub payload: ActionPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionPayload {
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Deserialize)]
pub struct GlobalPayload {
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub size: Option<GridSize>,
}

/// The `-info` JSON passed on the command line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationInfo {
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

impl RegistrationInfo {
    /// # Errors
    /// Returns the JSON error if `raw` is not a registration info object.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    #[must_use]
    pub fn grids(&self) -> HashMap<String, GridSize> {
        self.devices
            .iter()
            .filter_map(|d| d.size.map(|size| (d.id.clone(), size)))
            .collect()
    }
}

/// Frames to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Outbound {
    SetTitle {
        context: String,
        payload: TitlePayload,
    },
    SetImage {
        context: String,
        payload: ImagePayload,
    },
    SwitchToProfile {
        context: String,
        device: String,
        payload: ProfilePayload,
    },
    SetSettings {
        context: String,
        payload: serde_json::Value,
    },
    GetGlobalSettings {
        context: String,
    },
    SetGlobalSettings {
        context: String,
        payload: serde_json::Value,
    },
    OpenUrl {
        payload: UrlPayload,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitlePayload {
    pub title: String,
    /// 0 = hardware and software.
    pub target: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePayload {
    pub image: String,
    pub target: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlPayload {
    pub url: String,
}

/// Translate a decoded frame into a [`HostEvent`].
///
/// `grids` holds the layouts reported so far and is updated when a device
/// connects.
pub fn to_event(frame: Inbound, grids: &mut HashMap<String, GridSize>) -> Option<HostEvent> {
    let placement = |f: &ActionFrame, grids: &HashMap<String, GridSize>| KeyPlacement {
        device: f.device.clone(),
        coords: f.payload.coordinates.unwrap_or_default(),
        grid: grids.get(&f.device).copied(),
    };

    let event = match frame {
        Inbound::WillAppear(f) => HostEvent::WillAppear {
            placement: placement(&f, grids),
            action: f.action,
            button: ButtonId(f.context),
            settings: f.payload.settings,
        },
        Inbound::WillDisappear(f) => HostEvent::WillDisappear {
            action: f.action,
            button: ButtonId(f.context),
        },
        Inbound::KeyDown(f) => HostEvent::KeyDown {
            placement: placement(&f, grids),
            action: f.action,
            button: ButtonId(f.context),
            settings: f.payload.settings,
        },
        Inbound::KeyUp(f) => HostEvent::KeyUp {
            action: f.action,
            button: ButtonId(f.context),
        },
        Inbound::DidReceiveSettings(f) => HostEvent::SettingsChanged {
            action: f.action,
            button: ButtonId(f.context),
            settings: f.payload.settings,
        },
        Inbound::DidReceiveGlobalSettings { payload } => HostEvent::GlobalSettings(payload.settings),
        Inbound::DeviceDidConnect {
            device,
            device_info,
        } => {
            let grid = device_info.and_then(|info| info.size);
            if let Some(size) = grid {
                grids.insert(device.clone(), size);
            }
            HostEvent::DeviceConnected { device, grid }
        }
        Inbound::DeviceDidDisconnect { device } => HostEvent::DeviceDisconnected { device },
        Inbound::Other => return None,
    };

    Some(event)
}
