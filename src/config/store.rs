use crate::config::schema::{GlobalSettings, ProfileKind};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which device categories the user has hidden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visibility {
    pub hide_switches: bool,
    pub hide_alarms: bool,
    pub hide_groups: bool,
}

/// Immutable view of the settings, captured once per refresh or command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// `None` when the host has no usable base URL.
    pub base_url: Option<String>,
    pub profile_kind: ProfileKind,
    pub visibility: Visibility,
}

impl Settings {
    #[must_use]
    pub fn from_global(global: &GlobalSettings) -> Self {
        let base_url = global
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(ToString::to_string);

        let profile_kind = match global.profile_type.as_deref() {
            None => ProfileKind::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{e}, falling back to {}", ProfileKind::default());
                ProfileKind::default()
            }),
        };

        Self {
            base_url,
            profile_kind,
            visibility: Visibility {
                hide_switches: global.hide_switches.unwrap_or(false),
                hide_alarms: global.hide_alarms.unwrap_or(false),
                hide_groups: global.hide_switches_groups.unwrap_or(false),
            },
        }
    }
}

/// Holder for the host's global settings.
///
/// The host pushes changes into [`SettingsStore::apply`]; everything else
/// reads a snapshot.
pub struct SettingsStore {
    raw: ArcSwap<GlobalSettings>,
    current: ArcSwap<Settings>,
}

impl SettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: ArcSwap::from_pointee(GlobalSettings::default()),
            current: ArcSwap::from_pointee(Settings::default()),
        }
    }

    /// The derived settings as of now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    /// The last raw settings received from (or written to) the host.
    #[must_use]
    pub fn global(&self) -> Arc<GlobalSettings> {
        self.raw.load_full()
    }

    /// Replace the stored settings and return the new snapshot.
    pub fn apply(&self, global: GlobalSettings) -> Arc<Settings> {
        let settings = Arc::new(Settings::from_global(&global));
        debug!("settings updated: {settings:?}");
        self.raw.store(Arc::new(global));
        self.current.store(Arc::clone(&settings));
        settings
    }

    /// A copy of the raw settings with `profileType` replaced.
    #[must_use]
    pub fn global_with_kind(&self, kind: ProfileKind) -> GlobalSettings {
        let mut global = (*self.raw.load_full()).clone();
        global.profile_type = Some(kind.as_str().to_string());
        global
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_base_url_is_unset() {
        let global = GlobalSettings {
            base_url: Some("   ".to_string()),
            ..GlobalSettings::default()
        };
        assert_eq!(Settings::from_global(&global).base_url, None);
    }

    #[test]
    fn unknown_profile_type_falls_back_to_switches() {
        let global = GlobalSettings {
            profile_type: Some("smart_lights".to_string()),
            ..GlobalSettings::default()
        };
        assert_eq!(
            Settings::from_global(&global).profile_kind,
            ProfileKind::Switches
        );
    }

    #[test]
    fn apply_replaces_snapshot() {
        let store = SettingsStore::new();
        let before = store.snapshot();
        assert_eq!(before.base_url, None);

        store.apply(GlobalSettings {
            base_url: Some("http://host:8080".to_string()),
            profile_type: Some("smart_devices".to_string()),
            hide_alarms: Some(true),
            ..GlobalSettings::default()
        });

        let after = store.snapshot();
        assert_eq!(after.base_url.as_deref(), Some("http://host:8080"));
        assert_eq!(after.profile_kind, ProfileKind::Devices);
        assert!(after.visibility.hide_alarms);
        // Earlier snapshots are unaffected.
        assert_eq!(before.base_url, None);
    }

    #[test]
    fn global_with_kind_keeps_other_keys() {
        let store = SettingsStore::new();
        let mut global = GlobalSettings {
            base_url: Some("http://host:8080".to_string()),
            ..GlobalSettings::default()
        };
        global
            .extra
            .insert("serverPath".to_string(), serde_json::json!("/pop"));
        store.apply(global);

        let merged = store.global_with_kind(ProfileKind::SwitchGroups);
        assert_eq!(merged.profile_type.as_deref(), Some("switch_groups"));
        assert_eq!(merged.base_url.as_deref(), Some("http://host:8080"));
        assert_eq!(merged.extra["serverPath"], "/pop");
    }
}
