pub mod command;
pub mod launcher;

use crate::event::PluginEvent;
use crate::gateway::model::DeviceRef;
use crate::host::ButtonId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Presses at least this long count as holds.
pub const HOLD_THRESHOLD: Duration = Duration::from_millis(500);

/// How a completed press is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Tap,
    Hold,
}

impl Gesture {
    #[must_use]
    pub fn classify(elapsed: Duration) -> Self {
        if elapsed >= HOLD_THRESHOLD {
            Self::Hold
        } else {
            Self::Tap
        }
    }
}

#[derive(Debug)]
struct PressSession {
    id: u64,
    started: Instant,
    target: DeviceRef,
    hold_timer: Option<JoinHandle<()>>,
    hold_fired: bool,
}

impl PressSession {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.hold_timer.take() {
            timer.abort();
        }
    }
}

/// Per-key press state. At most one live session per key.
#[derive(Debug, Default)]
pub struct PressTracker {
    sessions: HashMap<ButtonId, PressSession>,
    next_id: u64,
}

impl PressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `button`, replacing any stale one.
    ///
    /// Group targets arm a hold timer that posts
    /// [`PluginEvent::HoldElapsed`] after [`HOLD_THRESHOLD`].
    pub fn begin(
        &mut self,
        button: ButtonId,
        target: DeviceRef,
        events: &mpsc::UnboundedSender<PluginEvent>,
    ) {
        self.discard(&button);

        self.next_id += 1;
        let id = self.next_id;

        let started = Instant::now();
        let hold_timer = matches!(target, DeviceRef::Group(_)).then(|| {
            let events = events.clone();
            let button = button.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(started + HOLD_THRESHOLD).await;
                let _ = events.send(PluginEvent::HoldElapsed {
                    button,
                    session: id,
                });
            })
        });

        debug!("press {id} on {button} -> {target:?}");
        self.sessions.insert(
            button,
            PressSession {
                id,
                started,
                target,
                hold_timer,
                hold_fired: false,
            },
        );
    }

    /// The hold timer of `session` fired. Returns the target to act on, or
    /// `None` if the session already ended.
    pub fn hold_elapsed(&mut self, button: &ButtonId, session: u64) -> Option<DeviceRef> {
        let live = self.sessions.get_mut(button)?;
        if live.id != session || live.hold_fired {
            return None;
        }
        live.hold_fired = true;
        live.hold_timer = None;
        Some(live.target.clone())
    }

    /// Close the session for `button`.
    ///
    /// Returns `None` when there was no session or its hold was already
    /// handled by the timer.
    pub fn end(&mut self, button: &ButtonId, now: Instant) -> Option<(Gesture, DeviceRef)> {
        let mut session = self.sessions.remove(button)?;
        session.cancel_timer();

        if session.hold_fired {
            debug!("press {} already handled as hold", session.id);
            return None;
        }

        let elapsed = now.saturating_duration_since(session.started);
        let gesture = Gesture::classify(elapsed);
        debug!("press {} released after {elapsed:?}: {gesture:?}", session.id);
        Some((gesture, session.target))
    }

    /// Drop the session for `button` without acting on it.
    pub fn discard(&mut self, button: &ButtonId) {
        if let Some(mut session) = self.sessions.remove(button) {
            session.cancel_timer();
        }
    }

    pub fn clear(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.cancel_timer();
        }
    }

    #[must_use]
    pub fn is_pressed(&self, button: &ButtonId) -> bool {
        self.sessions.contains_key(button)
    }
}
