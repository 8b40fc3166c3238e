use std::fmt;

/// What the buzzer should be doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlarmState {
    Off,
    On,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmState::Off => f.write_str("OFF"),
            AlarmState::On => f.write_str("ON"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceState {
    Connected,
    DisconnectedRetrying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpisodeOutcome {
    /// The device came back after this many retries (not counting the first attempt).
    Restored(u32),
    /// Every retry was spent without the device coming back.
    Exhausted(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Present,
    Absent(EpisodeOutcome),
}

impl TickOutcome {
    pub fn state(&self) -> PresenceState {
        match self {
            TickOutcome::Present => PresenceState::Connected,
            TickOutcome::Absent(_) => PresenceState::DisconnectedRetrying,
        }
    }
}
