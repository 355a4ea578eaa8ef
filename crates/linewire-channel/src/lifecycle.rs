use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Channel state. `Created -> Started -> Stopped`, each transition at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Created = 0,
    Started = 1,
    Stopped = 2,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Created,
            1 => ChannelState::Started,
            _ => ChannelState::Stopped,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelState::Created => "created",
            ChannelState::Started => "started",
            ChannelState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomic holder for [`ChannelState`].
///
/// Transitions only succeed from the expected state, so racing callers agree
/// on a single winner.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ChannelState::Created as u8),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_started(&self) -> bool {
        self.state() == ChannelState::Started
    }

    /// Move from `from` to `to`. Returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
