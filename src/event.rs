use crate::action::command::CommandReport;
use crate::error::Result;
use crate::gateway::FetchOutcome;
use crate::host::{ButtonId, HostEvent};
use crate::stream::StreamEvent;
use crate::tile::TileReading;

/// Everything the event loop reacts to.
///
/// Host callbacks, timers, fetch results and push updates are all funnelled
/// through one queue so that engine state is only touched from one place.
#[derive(Debug)]
pub enum PluginEvent {
    /// Lifecycle notification from the Stream Deck application.
    Host(HostEvent),

    /// A background refresh finished. `generation` is the engine generation
    /// the fetch was started under.
    Fetched {
        generation: u64,
        outcome: FetchOutcome,
    },

    /// A group key has been held past the hold threshold.
    HoldElapsed { button: ButtonId, session: u64 },

    /// A device command task ended, successfully or not.
    CommandSettled(CommandReport),

    /// Push update from the event stream.
    Stream(StreamEvent),

    /// A tile's poll period elapsed.
    TileDue { button: ButtonId, session: u64 },

    /// A tile read finished.
    TileRead {
        button: ButtonId,
        session: u64,
        reading: Result<TileReading>,
    },

    /// The host socket is gone.
    HostClosed,

    /// Stop the plugin.
    Shutdown,
}
