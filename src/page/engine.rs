use crate::action::command::{run_command, CommandGuard, CommandReport, CommandSlot};
use crate::action::{Gesture, PressTracker};
use crate::config::schema::ProfileKind;
use crate::config::store::Settings;
use crate::error::ErrorKind;
use crate::event::PluginEvent;
use crate::gateway::model::{decode_collection, Alarm, Device, DeviceRef, Switch, SwitchGroup};
use crate::gateway::{fetch_for, DeviceCommand, FetchOutcome, Gateway};
use crate::host::{ButtonId, GridSize, Host, KeyPlacement};
use crate::page::render::{device_face, failure_face, ButtonFace};
use crate::page::{button_index, Pager, Slot};
use crate::stream::{StreamEvent, Topic};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Assumed layout while the host has not reported a device's grid.
const FALLBACK_GRID: GridSize = GridSize { columns: 5, rows: 3 };

/// Key index of the failure label on the first page.
const STATUS_SLOT: usize = 1;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Owner of the device profile: device list, paging, key faces, presses
/// and commands.
///
/// Runs entirely on the event loop. Background work (fetches, commands,
/// hold timers) reports back through the plugin event queue.
pub struct ProfileEngine {
    host: Arc<dyn Host>,
    gateway: Arc<dyn Gateway>,
    events: mpsc::UnboundedSender<PluginEvent>,
    settings: Arc<Settings>,

    switches: Vec<Switch>,
    alarms: Vec<Alarm>,
    groups: Vec<SwitchGroup>,
    devices: Vec<Device>,
    /// Kind of the last failed fetch, cleared by a clean one.
    status: Option<ErrorKind>,

    pager: Pager,
    default_capacity: usize,
    known: BTreeMap<ButtonId, KeyPlacement>,

    presses: PressTracker,
    commands: CommandSlot,
    /// Bumped whenever collections are discarded; fetches started under an
    /// older generation are ignored.
    generation: u64,
    /// A refresh was skipped behind a running command.
    refresh_wanted: bool,
}

impl ProfileEngine {
    pub fn new(
        host: Arc<dyn Host>,
        gateway: Arc<dyn Gateway>,
        events: mpsc::UnboundedSender<PluginEvent>,
        settings: Arc<Settings>,
        default_capacity: usize,
    ) -> Self {
        Self {
            host,
            gateway,
            events,
            settings,
            switches: Vec::new(),
            alarms: Vec::new(),
            groups: Vec::new(),
            devices: Vec::new(),
            status: None,
            pager: Pager::new(default_capacity),
            default_capacity,
            known: BTreeMap::new(),
            presses: PressTracker::new(),
            commands: CommandSlot::new(),
            generation: 0,
            refresh_wanted: false,
        }
    }

    /// At least one profile key is on screen.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.known.is_empty()
    }

    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    #[must_use]
    pub const fn current_page(&self) -> usize {
        self.pager.current_page()
    }

    #[must_use]
    pub fn command_in_flight(&self) -> bool {
        self.commands.is_busy()
    }

    // --- Lifecycle ---

    pub fn button_appeared(&mut self, button: ButtonId, placement: KeyPlacement) {
        let first = self.known.is_empty();
        if first {
            let capacity = placement
                .grid
                .map_or(self.default_capacity, GridSize::key_count);
            self.pager.set_capacity(capacity);
            info!(
                "profile visible, {} keys per page",
                self.pager.capacity()
            );
        }

        self.known.insert(button.clone(), placement);
        self.render_button(&button);

        if first {
            self.refresh();
        }
    }

    pub fn button_disappeared(&mut self, button: &ButtonId) {
        self.presses.discard(button);
        if self.known.remove(button).is_some() && self.known.is_empty() {
            self.teardown();
        }
    }

    /// Forget everything tied to the profile being on screen.
    fn teardown(&mut self) {
        info!("profile hidden, dropping device state");
        self.presses.clear();
        self.pager.reset();
        self.discard_collections();
    }

    fn discard_collections(&mut self) {
        self.switches.clear();
        self.alarms.clear();
        self.groups.clear();
        self.devices.clear();
        self.status = None;
        self.generation += 1;
    }

    /// The host reported a device's layout after its keys appeared.
    pub fn device_connected(&mut self, device: &str, grid: Option<GridSize>) {
        let Some(grid) = grid else { return };
        let mut touched = false;
        for placement in self.known.values_mut().filter(|p| p.device == device) {
            placement.grid = Some(grid);
            touched = true;
        }
        if !touched {
            return;
        }

        let before = self.pager.capacity();
        self.pager.set_capacity(grid.key_count());
        if self.pager.capacity() != before {
            info!("{device} reported its layout, {} keys per page", self.pager.capacity());
            self.pager.clamp(self.devices.len());
        }
        self.render_all();
    }

    pub fn settings_changed(&mut self, settings: Arc<Settings>) {
        if *settings == *self.settings {
            return;
        }

        let kind_changed = settings.profile_kind != self.settings.profile_kind;
        let url_changed = settings.base_url != self.settings.base_url;
        self.settings = settings;

        if kind_changed {
            info!("profile kind is now {}", self.settings.profile_kind);
            self.presses.clear();
            self.pager.reset();
            self.discard_collections();
        }

        self.rebuild();

        if kind_changed || url_changed {
            self.refresh();
        }
    }

    // --- Data ---

    /// Start a background fetch for the current profile kind.
    ///
    /// Deferred while a command is in flight; the command's own read-back
    /// takes its place unless the settings changed underneath it.
    pub fn refresh(&mut self) {
        if !self.is_visible() {
            debug!("refresh skipped, profile not visible");
            return;
        }
        if self.commands.is_busy() {
            debug!("refresh deferred, command in flight");
            self.refresh_wanted = true;
            return;
        }

        let gateway = Arc::clone(&self.gateway);
        let settings = Arc::clone(&self.settings);
        let events = self.events.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let outcome = fetch_for(gateway.as_ref(), &settings).await;
            let _ = events.send(PluginEvent::Fetched {
                generation,
                outcome,
            });
        });
    }

    pub fn apply_fetch(&mut self, generation: u64, outcome: FetchOutcome) {
        if generation != self.generation {
            debug!("dropping fetch from generation {generation}");
            return;
        }
        if self.commands.is_busy() {
            debug!("dropping fetch, command in flight");
            return;
        }
        self.ingest(outcome);
        self.rebuild();
    }

    /// Store every collection that arrived; failed ones keep their previous
    /// snapshot.
    fn ingest(&mut self, outcome: FetchOutcome) {
        let mut failure = None;

        match outcome.switches {
            Some(Ok(switches)) => self.switches = switches,
            Some(Err(e)) => {
                warn!("switch fetch failed: {e}");
                failure = failure.or(Some(e.kind()));
            }
            None => {}
        }
        match outcome.alarms {
            Some(Ok(alarms)) => self.alarms = alarms,
            Some(Err(e)) => {
                warn!("alarm fetch failed: {e}");
                failure = failure.or(Some(e.kind()));
            }
            None => {}
        }
        match outcome.groups {
            Some(Ok(groups)) => self.groups = groups,
            Some(Err(e)) => {
                warn!("switch group fetch failed: {e}");
                failure = failure.or(Some(e.kind()));
            }
            None => {}
        }

        self.status = failure;
    }

    /// Push update from the event stream.
    pub fn apply_stream(&mut self, event: &StreamEvent) {
        if !self.is_visible() || self.commands.is_busy() {
            debug!("dropping push update for {:?}", event.topic);
            return;
        }

        let Topic::Key(key) = &event.topic else { return };
        let payload = event.payload.clone();
        let applied = match key.as_str() {
            "switches" => decode_collection(payload).map(|v| self.switches = v),
            "alarms" => decode_collection(payload).map(|v| self.alarms = v),
            "switchgroups" => decode_collection(payload).map(|v| self.groups = v),
            _ => return,
        };

        match applied {
            Ok(()) => {
                debug!("applied push update for {key}");
                self.rebuild();
            }
            Err(e) => warn!("ignoring push update for {key}: {e}"),
        }
    }

    /// Recompute the device list, pull the page back into range and redraw.
    fn rebuild(&mut self) {
        let hide = self.settings.visibility;
        let kind = self.settings.profile_kind;

        let wants_switches = matches!(kind, ProfileKind::Switches | ProfileKind::Devices);
        let wants_alarms = matches!(kind, ProfileKind::Alarms | ProfileKind::Devices);
        let wants_groups = matches!(kind, ProfileKind::SwitchGroups | ProfileKind::Devices);

        let mut devices = Vec::new();
        if wants_switches && !hide.hide_switches {
            devices.extend(
                self.switches
                    .iter()
                    .filter(|s| s.reachable)
                    .cloned()
                    .map(Device::Switch),
            );
        }
        if wants_alarms && !hide.hide_alarms {
            devices.extend(
                self.alarms
                    .iter()
                    .filter(|a| a.reachable)
                    .cloned()
                    .map(Device::Alarm),
            );
        }
        if wants_groups && !hide.hide_groups {
            devices.extend(self.groups.iter().cloned().map(Device::Group));
        }

        if kind == ProfileKind::Devices {
            devices.sort_by(Device::listing_order);
        }

        self.devices = devices;
        self.pager.clamp(self.devices.len());
        self.render_all();
    }

    // --- Rendering ---

    fn slot_of(&self, placement: &KeyPlacement) -> Slot {
        let grid = placement.grid.unwrap_or(FALLBACK_GRID);
        let index = button_index(placement.coords, grid);
        self.pager.slot(index, self.devices.len())
    }

    fn face_for(&self, placement: &KeyPlacement) -> ButtonFace {
        match self.slot_of(placement) {
            Slot::Back => ButtonFace::text("Back"),
            Slot::PageAdvance(None) => ButtonFace::blank(),
            Slot::PageAdvance(Some((page, total))) => ButtonFace::text(format!("Page {page}/{total}")),
            Slot::Device(i) => device_face(
                &self.devices[i],
                &self.switches,
                self.settings.profile_kind == ProfileKind::Devices,
                now_unix(),
            ),
            Slot::Empty => {
                let grid = placement.grid.unwrap_or(FALLBACK_GRID);
                let on_status_slot = self.pager.current_page() == 0
                    && button_index(placement.coords, grid) == STATUS_SLOT;
                match self.status {
                    Some(kind) if on_status_slot && self.devices.is_empty() => failure_face(kind),
                    _ => ButtonFace::blank(),
                }
            }
        }
    }

    pub fn render_button(&self, button: &ButtonId) {
        let Some(placement) = self.known.get(button) else {
            return;
        };
        let face = self.face_for(placement);
        self.host.set_title(button, &face.title);
        self.host.set_image(button, &face.image);
    }

    pub fn render_all(&self) {
        debug!(
            "rendering {} keys, page {}, {} devices",
            self.known.len(),
            self.pager.current_page() + 1,
            self.devices.len()
        );
        for button in self.known.keys() {
            self.render_button(button);
        }
    }

    // --- Input ---

    pub fn key_down(&mut self, button: ButtonId, placement: KeyPlacement) {
        let slot = self.slot_of(&placement);
        self.known.insert(button.clone(), placement.clone());

        match slot {
            Slot::Back => {
                info!("leaving device profile");
                self.host.switch_to_profile(&placement.device, None);
            }
            Slot::PageAdvance(_) => {
                self.pager.advance(self.devices.len());
                self.render_all();
            }
            Slot::Device(i) => {
                let target = self.devices[i].reference();
                self.presses.begin(button, target, &self.events);
            }
            Slot::Empty => {}
        }
    }

    pub fn key_up(&mut self, button: &ButtonId) {
        let Some((gesture, target)) = self.presses.end(button, Instant::now()) else {
            return;
        };
        let Some(device) = self.devices.iter().find(|d| d.matches(&target)) else {
            debug!("{target:?} is gone, ignoring release");
            return;
        };

        match (gesture, device) {
            (Gesture::Tap, Device::Switch(s)) => {
                let command = DeviceCommand::Toggle {
                    switch_id: s.id.clone(),
                };
                self.dispatch(command);
            }
            (Gesture::Tap, Device::Alarm(_)) => self.refresh(),
            (Gesture::Tap, Device::Group(g)) => {
                let command = DeviceCommand::GroupOn {
                    group_id: g.id.clone(),
                };
                self.dispatch(command);
            }
            // The release beat the hold timer to the queue.
            (Gesture::Hold, Device::Group(g)) => {
                let command = DeviceCommand::GroupOff {
                    group_id: g.id.clone(),
                };
                self.dispatch(command);
            }
            (Gesture::Hold, _) => debug!("hold on {target:?} has no action"),
        }
    }

    pub fn hold_elapsed(&mut self, button: &ButtonId, session: u64) {
        let Some(DeviceRef::Group(group_id)) = self.presses.hold_elapsed(button, session) else {
            return;
        };
        if self.groups.iter().any(|g| g.id == group_id) {
            self.dispatch(DeviceCommand::GroupOff { group_id });
        }
    }

    // --- Commands ---

    fn dispatch(&mut self, command: DeviceCommand) {
        if self.settings.base_url.is_none() {
            error!("cannot send {}: base URL not configured", command.path());
            return;
        }

        match self.commands.acquire(command.clone()) {
            Some(ticket) => self.start_command(ticket, command),
            None => debug!("{} parked behind running command", command.path()),
        }
    }

    fn start_command(&mut self, ticket: u64, command: DeviceCommand) {
        if let DeviceCommand::Toggle { switch_id } = &command {
            self.flip_switch(switch_id);
            self.rebuild();
        }

        let guard = CommandGuard::new(ticket, self.generation, command, self.events.clone());
        tokio::spawn(run_command(
            Arc::clone(&self.gateway),
            Arc::clone(&self.settings),
            guard,
        ));
    }

    fn flip_switch(&mut self, switch_id: &str) {
        if let Some(s) = self.switches.iter_mut().find(|s| s.id == switch_id) {
            s.active = !s.active;
        }
    }

    pub fn command_settled(&mut self, report: CommandReport) {
        if !self.commands.owns(report.ticket) {
            debug!("ignoring stale report for ticket {}", report.ticket);
            return;
        }
        let parked = self.commands.release();
        let mut refresh = std::mem::take(&mut self.refresh_wanted);

        if !self.is_visible() {
            debug!("profile hidden, discarding command result");
            return;
        }

        if report.generation != self.generation {
            debug!(
                "discarding {} result from generation {}",
                report.command.path(),
                report.generation
            );
            refresh = true;
        } else {
            match report.outcome {
                Ok(outcome) => {
                    self.ingest(outcome);
                    self.rebuild();
                    refresh = false;
                }
                Err(e) => {
                    warn!("{} failed: {e}", report.command.path());
                    match &report.command {
                        DeviceCommand::Toggle { switch_id } => {
                            self.flip_switch(switch_id);
                            self.rebuild();
                        }
                        DeviceCommand::GroupOn { .. } | DeviceCommand::GroupOff { .. } => {
                            refresh = true;
                        }
                    }
                }
            }
        }

        if let Some(next) = parked {
            self.dispatch(next);
        }
        if refresh {
            self.refresh();
        }
    }
}
