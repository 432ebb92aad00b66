use crate::config::schema::ProfileKind;
use crate::config::store::{Settings, SettingsStore};
use crate::error::Result;
use crate::host::{ButtonId, Host};
use std::sync::Arc;
use tracing::info;

/// Keys placed inside the device profile.
pub const PROFILE_ACTION: &str = "com.aurum.rust-deck.profile-action";

/// Standalone key that returns to the host's default profile.
pub const BACK_ACTION: &str = "com.aurum.rust-deck.back";
pub const DEFAULT_PROFILE: &str = "Default";

const LAUNCHERS: [(&str, ProfileKind); 4] = [
    ("com.aurum.rust-deck.smart-switches", ProfileKind::Switches),
    ("com.aurum.rust-deck.smart-alarms", ProfileKind::Alarms),
    ("com.aurum.rust-deck.smart-devices", ProfileKind::Devices),
    ("com.aurum.rust-deck.switch-groups", ProfileKind::SwitchGroups),
];

/// The profile kind a launcher action opens, if `action` is a launcher.
#[must_use]
pub fn launcher_kind(action: &str) -> Option<ProfileKind> {
    LAUNCHERS
        .iter()
        .find(|(uuid, _)| *uuid == action)
        .map(|(_, kind)| *kind)
}

/// Open the device profile showing `kind`.
///
/// `profileType` is merged into the global settings (other keys kept),
/// written to the host and applied locally. A `fromProfile` value in the
/// launcher's own settings is remembered as `previousProfile`.
///
/// # Errors
/// Returns `DeckError::Json` if the settings cannot be serialized.
pub fn launch(
    host: &dyn Host,
    store: &SettingsStore,
    kind: ProfileKind,
    profile_name: &str,
    button: &ButtonId,
    device: &str,
    key_settings: &serde_json::Value,
) -> Result<Arc<Settings>> {
    let global = store.global_with_kind(kind);
    host.set_global_settings(&serde_json::to_value(&global)?);
    let settings = store.apply(global);

    if let Some(from) = key_settings.get("fromProfile") {
        let mut remembered = key_settings.clone();
        if let Some(map) = remembered.as_object_mut() {
            map.insert("previousProfile".to_string(), from.clone());
        }
        host.set_settings(button, &remembered);
    }

    info!("opening {profile_name} as {kind} on {device}");
    host.switch_to_profile(device, Some(profile_name));
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::GlobalSettings;
    use crate::host::recording::RecordingHost;
    use serde_json::json;

    #[test]
    fn launcher_uuids() {
        assert_eq!(
            launcher_kind("com.aurum.rust-deck.smart-alarms"),
            Some(ProfileKind::Alarms)
        );
        assert_eq!(
            launcher_kind("com.aurum.rust-deck.switch-groups"),
            Some(ProfileKind::SwitchGroups)
        );
        assert_eq!(launcher_kind(PROFILE_ACTION), None);
    }

    #[test]
    fn launch_merges_kind_and_switches_profile() {
        let host = RecordingHost::default();
        let store = SettingsStore::new();
        store.apply(GlobalSettings {
            base_url: Some("http://host:8080".into()),
            hide_alarms: Some(true),
            ..GlobalSettings::default()
        });

        let button = ButtonId("launcher".into());
        let settings = launch(
            &host,
            &store,
            ProfileKind::Devices,
            "profiles/Rustplusplus",
            &button,
            "dev-1",
            &json!({"fromProfile": "Gaming"}),
        )
        .unwrap();

        assert_eq!(settings.profile_kind, ProfileKind::Devices);
        assert_eq!(settings.base_url.as_deref(), Some("http://host:8080"));
        assert!(settings.visibility.hide_alarms);

        let recorded = host.snapshot();
        assert_eq!(
            recorded.global_settings,
            vec![json!({"baseUrl": "http://host:8080", "profileType": "smart_devices", "hideAlarms": true})]
        );
        assert_eq!(
            recorded.profile_switches,
            vec![("dev-1".to_string(), Some("profiles/Rustplusplus".to_string()))]
        );
        assert_eq!(recorded.settings[&button]["previousProfile"], "Gaming");
    }

    #[test]
    fn launch_without_from_profile_leaves_key_settings() {
        let host = RecordingHost::default();
        let store = SettingsStore::new();
        launch(
            &host,
            &store,
            ProfileKind::Alarms,
            "profiles/Rustplusplus",
            &ButtonId("launcher".into()),
            "dev-1",
            &json!({}),
        )
        .unwrap();
        assert!(host.snapshot().settings.is_empty());
    }
}
