use crate::error::ErrorKind;
use crate::gateway::model::{Alarm, Device, Switch, SwitchGroup};
use std::fmt;

const ICONS_ON: &str = "imgs/icons/electrics_enabled/";
const ICONS_OFF: &str = "imgs/icons/electrics/";
const DEFAULT_GROUP_ICON: &str = "switch.png";

/// What a single key should show. An empty `image` clears the key's icon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonFace {
    pub title: String,
    pub image: String,
}

impl ButtonFace {
    #[must_use]
    pub fn blank() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            image: String::new(),
        }
    }
}

/// Aggregate state of a switch group, derived from its member switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    /// None of the members are in the current switch list.
    Unknown,
    AllOff,
    AllOn,
    Partial { on: usize, total: usize },
}

impl GroupStatus {
    #[must_use]
    pub fn of(group: &SwitchGroup, switches: &[Switch]) -> Self {
        let members: Vec<&Switch> = switches
            .iter()
            .filter(|s| s.reachable && group.members.contains(&s.id))
            .collect();

        let total = members.len();
        let on = members.iter().filter(|s| s.active).count();

        match (on, total) {
            (_, 0) => Self::Unknown,
            (0, _) => Self::AllOff,
            (on, total) if on == total => Self::AllOn,
            (on, total) => Self::Partial { on, total },
        }
    }

    #[must_use]
    pub const fn any_on(self) -> bool {
        matches!(self, Self::AllOn | Self::Partial { .. })
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("Unknown"),
            Self::AllOff => f.write_str("All Off"),
            Self::AllOn => f.write_str("All On"),
            Self::Partial { on, total } => write!(f, "{on}/{total} On"),
        }
    }
}

/// Compact relative time for an alarm's last trigger.
///
/// Only the largest whole unit is shown, e.g. `(1h ago)`.
#[must_use]
pub fn time_ago(unix_seconds: i64, now_unix: i64) -> String {
    const UNITS: [(&str, i64); 7] = [
        ("y", 31_536_000),
        ("mo", 2_592_000),
        ("w", 604_800),
        ("d", 86_400),
        ("h", 3_600),
        ("m", 60),
        ("s", 1),
    ];

    if unix_seconds == 0 {
        return "Never".to_string();
    }

    let delta = now_unix.saturating_sub(unix_seconds);
    if delta <= 0 {
        return "now".to_string();
    }

    UNITS
        .iter()
        .find(|(_, secs)| delta >= *secs)
        .map_or_else(
            || "now".to_string(),
            |(label, secs)| format!("({}{label} ago)", delta / secs),
        )
}

/// Label and icon for one device.
///
/// `tagged` adds the variant marker line used by the combined listing;
/// `switches` is the current switch collection, used for group state.
#[must_use]
pub fn device_face(device: &Device, switches: &[Switch], tagged: bool, now_unix: i64) -> ButtonFace {
    match device {
        Device::Switch(s) => switch_face(s, tagged),
        Device::Alarm(a) => alarm_face(a, tagged, now_unix),
        Device::Group(g) => group_face(g, switches, tagged),
    }
}

fn on_off(active: bool) -> &'static str {
    if active {
        "On"
    } else {
        "Off"
    }
}

fn icon(active: bool, image: &str) -> String {
    let folder = if active { ICONS_ON } else { ICONS_OFF };
    format!("{folder}{image}")
}

fn tag(tagged: bool, marker: &'static str) -> &'static str {
    if tagged {
        marker
    } else {
        ""
    }
}

fn switch_face(s: &Switch, tagged: bool) -> ButtonFace {
    ButtonFace {
        title: format!(
            "{}\n{}\n{}\n{}",
            tag(tagged, "[S]"),
            s.name,
            s.location,
            on_off(s.active)
        ),
        image: icon(s.active, &s.image),
    }
}

fn alarm_face(a: &Alarm, tagged: bool, now_unix: i64) -> ButtonFace {
    ButtonFace {
        title: format!(
            "{}\n{}\n{}\n{}\n{}",
            tag(tagged, "[A]"),
            a.name,
            a.location,
            on_off(a.active),
            time_ago(a.last_trigger, now_unix)
        ),
        image: icon(a.active, &a.image),
    }
}

fn group_face(g: &SwitchGroup, switches: &[Switch], tagged: bool) -> ButtonFace {
    let status = GroupStatus::of(g, switches);
    let image = if g.image.is_empty() {
        DEFAULT_GROUP_ICON
    } else {
        &g.image
    };

    ButtonFace {
        title: format!(
            "{}\n{}\n{} switches\n{status}",
            tag(tagged, "[G]"),
            g.name,
            g.members.len()
        ),
        image: icon(status.any_on(), image),
    }
}

/// Label shown in place of an empty device list after a failed fetch.
#[must_use]
pub fn failure_face(kind: ErrorKind) -> ButtonFace {
    match kind {
        ErrorKind::Config => ButtonFace::text("No URL"),
        ErrorKind::Decode => ButtonFace::text("Bad Data"),
        ErrorKind::Transport | ErrorKind::Command | ErrorKind::Other => ButtonFace::text("Offline"),
    }
}
