use crate::config::store::Settings;
use crate::error::{DeckError, Result};
use crate::event::PluginEvent;
use crate::gateway::{fetch_for, DeviceCommand, FetchOutcome, Gateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Wait after a toggle before reading back the backend state.
pub const TOGGLE_SETTLE: Duration = Duration::from_millis(300);
/// Wait after a group command; groups touch several switches.
pub const GROUP_SETTLE: Duration = Duration::from_millis(500);

#[must_use]
pub const fn settle_delay(command: &DeviceCommand) -> Duration {
    match command {
        DeviceCommand::Toggle { .. } => TOGGLE_SETTLE,
        DeviceCommand::GroupOn { .. } | DeviceCommand::GroupOff { .. } => GROUP_SETTLE,
    }
}

/// Final word from a command task.
#[derive(Debug)]
pub struct CommandReport {
    pub ticket: u64,
    /// Collection generation the command was started under. The read-back
    /// used that generation's settings.
    pub generation: u64,
    pub command: DeviceCommand,
    /// `Err` if the command itself failed. On success, the follow-up fetch.
    pub outcome: Result<FetchOutcome>,
}

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Idle,
    InFlight {
        ticket: u64,
        queued: Option<DeviceCommand>,
    },
}

/// Single-slot command queue.
///
/// One command runs at a time. A command requested meanwhile is parked; a
/// later request replaces the parked one.
#[derive(Debug, Default)]
pub struct CommandSlot {
    state: SlotState,
    next_ticket: u64,
}

impl CommandSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self.state, SlotState::InFlight { .. })
    }

    /// Claim the slot for `command`. Returns the ticket to run it under, or
    /// `None` if it was parked behind the running command.
    pub fn acquire(&mut self, command: DeviceCommand) -> Option<u64> {
        if let SlotState::InFlight { queued, .. } = &mut self.state {
            if let Some(replaced) = queued.replace(command) {
                debug!("dropping parked command {replaced:?}");
            }
            return None;
        }

        self.next_ticket += 1;
        self.state = SlotState::InFlight {
            ticket: self.next_ticket,
            queued: None,
        };
        Some(self.next_ticket)
    }

    #[must_use]
    pub fn owns(&self, ticket: u64) -> bool {
        matches!(self.state, SlotState::InFlight { ticket: t, .. } if t == ticket)
    }

    /// Free the slot, handing back the parked command if any.
    pub fn release(&mut self) -> Option<DeviceCommand> {
        match std::mem::take(&mut self.state) {
            SlotState::InFlight { queued, .. } => queued,
            SlotState::Idle => None,
        }
    }
}

/// Reports a command's completion exactly once.
///
/// If the task ends without calling [`CommandGuard::finish`] (panic or
/// abort), dropping the guard reports the command as failed so the slot is
/// always released.
pub struct CommandGuard {
    ticket: u64,
    generation: u64,
    command: Option<DeviceCommand>,
    events: mpsc::UnboundedSender<PluginEvent>,
}

impl CommandGuard {
    #[must_use]
    pub fn new(
        ticket: u64,
        generation: u64,
        command: DeviceCommand,
        events: mpsc::UnboundedSender<PluginEvent>,
    ) -> Self {
        Self {
            ticket,
            generation,
            command: Some(command),
            events,
        }
    }

    fn report(&mut self, outcome: Result<FetchOutcome>) {
        if let Some(command) = self.command.take() {
            let _ = self.events.send(PluginEvent::CommandSettled(CommandReport {
                ticket: self.ticket,
                generation: self.generation,
                command,
                outcome,
            }));
        }
    }

    pub fn finish(mut self, outcome: Result<FetchOutcome>) {
        self.report(outcome);
    }
}

impl Drop for CommandGuard {
    fn drop(&mut self) {
        if self.command.is_some() {
            warn!("command task {} ended without a report", self.ticket);
            self.report(Err(DeckError::Command("command task aborted".to_string())));
        }
    }
}

/// Send the command, let the backend settle, then read back its state.
pub async fn run_command(gateway: Arc<dyn Gateway>, settings: Arc<Settings>, guard: CommandGuard) {
    let Some(command) = guard.command.clone() else {
        return;
    };

    info!("sending {}", command.path());
    if let Err(e) = gateway.send(settings.base_url.as_deref(), &command).await {
        warn!("{} failed: {e}", command.path());
        guard.finish(Err(e));
        return;
    }

    tokio::time::sleep(settle_delay(&command)).await;
    let outcome = fetch_for(gateway.as_ref(), &settings).await;
    guard.finish(Ok(outcome));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProfileKind;
    use crate::gateway::fake::{switch, FakeGateway};

    fn toggle(id: &str) -> DeviceCommand {
        DeviceCommand::Toggle {
            switch_id: id.to_string(),
        }
    }

    #[test]
    fn slot_parks_latest_request() {
        let mut slot = CommandSlot::new();
        let ticket = slot.acquire(toggle("1")).unwrap();
        assert!(slot.is_busy());
        assert!(slot.owns(ticket));

        assert_eq!(slot.acquire(toggle("2")), None);
        assert_eq!(slot.acquire(toggle("3")), None);

        assert_eq!(slot.release(), Some(toggle("3")));
        assert!(!slot.is_busy());
        assert!(!slot.owns(ticket));

        let next = slot.acquire(toggle("3")).unwrap();
        assert_ne!(next, ticket);
    }

    #[test]
    fn settle_delays() {
        assert_eq!(settle_delay(&toggle("1")), Duration::from_millis(300));
        assert_eq!(
            settle_delay(&DeviceCommand::GroupOff { group_id: "g".into() }),
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn dropped_guard_still_reports() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(CommandGuard::new(4, 2, toggle("1"), tx));

        match rx.recv().await {
            Some(PluginEvent::CommandSettled(report)) => {
                assert_eq!(report.ticket, 4);
                assert_eq!(report.generation, 2);
                assert!(matches!(report.outcome, Err(DeckError::Command(_))));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn aborted_task_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let guard = CommandGuard::new(9, 0, toggle("1"), tx);
        let task = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        task.abort();

        match rx.recv().await {
            Some(PluginEvent::CommandSettled(report)) => assert_eq!(report.ticket, 9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_command_waits_then_reads_back() {
        let gateway = Arc::new(FakeGateway::with_switches(vec![switch("1", "Door", false)]));
        let settings = Arc::new(Settings {
            base_url: Some("http://fake".into()),
            profile_kind: ProfileKind::Switches,
            ..Settings::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();

        let started = tokio::time::Instant::now();
        run_command(gateway.clone(), settings, CommandGuard::new(1, 0, toggle("1"), tx)).await;
        assert!(started.elapsed() >= TOGGLE_SETTLE);

        let Some(PluginEvent::CommandSettled(report)) = rx.recv().await else {
            panic!("no report");
        };
        let switches = report.outcome.unwrap().switches.unwrap().unwrap();
        assert!(switches[0].active);
        assert_eq!(gateway.commands(), vec![toggle("1")]);
    }
}
