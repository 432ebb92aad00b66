pub mod connection;
pub mod protocol;

use serde::Deserialize;
use std::fmt;

/// Stable identity of one key instance (the host's action context).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ButtonId(pub String);

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a key on its device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Coordinates {
    pub column: usize,
    pub row: usize,
}

/// Key layout of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GridSize {
    pub columns: usize,
    pub rows: usize,
}

impl GridSize {
    #[must_use]
    pub const fn key_count(self) -> usize {
        self.columns * self.rows
    }
}

/// Where a visible key lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPlacement {
    /// Host device id, needed for profile switching.
    pub device: String,
    pub coords: Coordinates,
    /// `None` until the host has reported the device's layout.
    pub grid: Option<GridSize>,
}

/// Lifecycle notifications from the host application.
#[derive(Debug, Clone)]
pub enum HostEvent {
    WillAppear {
        action: String,
        button: ButtonId,
        placement: KeyPlacement,
        settings: serde_json::Value,
    },
    WillDisappear {
        action: String,
        button: ButtonId,
    },
    KeyDown {
        action: String,
        button: ButtonId,
        placement: KeyPlacement,
        settings: serde_json::Value,
    },
    KeyUp {
        action: String,
        button: ButtonId,
    },
    SettingsChanged {
        action: String,
        button: ButtonId,
        settings: serde_json::Value,
    },
    GlobalSettings(serde_json::Value),
    DeviceConnected {
        device: String,
        grid: Option<GridSize>,
    },
    DeviceDisconnected {
        device: String,
    },
}

/// Primitives the host offers for driving keys.
///
/// Calls are queued and delivered in order; none of them block.
pub trait Host: Send + Sync {
    fn set_title(&self, button: &ButtonId, title: &str);

    /// An empty `image` clears the key's icon.
    fn set_image(&self, button: &ButtonId, image: &str);

    /// `None` returns to the previously active profile.
    fn switch_to_profile(&self, device: &str, profile: Option<&str>);

    fn set_settings(&self, button: &ButtonId, settings: &serde_json::Value);

    /// The reply arrives as [`HostEvent::GlobalSettings`].
    fn request_global_settings(&self);

    fn set_global_settings(&self, settings: &serde_json::Value);

    /// Hand a URL to the operating system's default handler.
    fn open_url(&self, url: &str);
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default, Clone)]
    pub(crate) struct Recorded {
        pub titles: HashMap<ButtonId, String>,
        pub images: HashMap<ButtonId, String>,
        pub profile_switches: Vec<(String, Option<String>)>,
        pub settings: HashMap<ButtonId, serde_json::Value>,
        pub global_settings: Vec<serde_json::Value>,
        pub opened_urls: Vec<String>,
    }

    /// [`Host`] that remembers the last state of every key.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub recorded: Mutex<Recorded>,
    }

    impl RecordingHost {
        pub fn title(&self, button: &str) -> Option<String> {
            self.recorded
                .lock()
                .unwrap()
                .titles
                .get(&ButtonId(button.to_string()))
                .cloned()
        }

        pub fn image(&self, button: &str) -> Option<String> {
            self.recorded
                .lock()
                .unwrap()
                .images
                .get(&ButtonId(button.to_string()))
                .cloned()
        }

        pub fn snapshot(&self) -> Recorded {
            self.recorded.lock().unwrap().clone()
        }
    }

    impl Host for RecordingHost {
        fn set_title(&self, button: &ButtonId, title: &str) {
            self.recorded
                .lock()
                .unwrap()
                .titles
                .insert(button.clone(), title.to_string());
        }

        fn set_image(&self, button: &ButtonId, image: &str) {
            self.recorded
                .lock()
                .unwrap()
                .images
                .insert(button.clone(), image.to_string());
        }

        fn switch_to_profile(&self, device: &str, profile: Option<&str>) {
            self.recorded
                .lock()
                .unwrap()
                .profile_switches
                .push((device.to_string(), profile.map(ToString::to_string)));
        }

        fn set_settings(&self, button: &ButtonId, settings: &serde_json::Value) {
            self.recorded
                .lock()
                .unwrap()
                .settings
                .insert(button.clone(), settings.clone());
        }

        fn request_global_settings(&self) {}

        fn set_global_settings(&self, settings: &serde_json::Value) {
            self.recorded
                .lock()
                .unwrap()
                .global_settings
                .push(settings.clone());
        }

        fn open_url(&self, url: &str) {
            self.recorded
                .lock()
                .unwrap()
                .opened_urls
                .push(url.to_string());
        }
    }
}
