//! Push channel state machine.
//!
//! # State Diagram
//!
//! ```text
//! ┌──────────────┐   dial    ┌────────────┐  opened   ┌──────────┐
//! │ Disconnected │──────────▶│ Connecting │──────────▶│   Open   │
//! └──────────────┘           └─────┬──────┘           └────┬─────┘
//!        ▲  ▲                      │ failed                │ │
//!        │  └──────────────────────┘                       │ │ close
//!        │                 dropped                         │ ▼
//!        ├─────────────────────────────────────────────────┘ ┌─────────┐
//!        │                 closed                            │ Closing │
//!        └───────────────────────────────────────────────────┴─────────┘
//! ```
//!
//! `Dropped` is an unsolicited close and is the only path that leads to a
//! reconnect. `Close`/`Closed` are the explicit teardown path.

use std::fmt;

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Start opening a transport.
    Dial,
    /// Handshake completed.
    Opened,
    /// Handshake failed.
    Failed,
    /// Server or network closed the connection.
    Dropped,
    /// Caller asked to tear down.
    Close,
    /// Teardown finished.
    Closed,
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub event: LinkEvent,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transition from {} via {:?}: {}",
            self.from, self.event, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Connection state machine.
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    state: ConnectionState,
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply_mut(&mut self, event: LinkEvent) -> Result<ConnectionState, InvalidTransition> {
        self.state = self.transition(event)?;
        Ok(self.state)
    }

    fn transition(&self, event: LinkEvent) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;
        use LinkEvent::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.state,
            event,
            reason,
        };

        match (self.state, event) {
            (Disconnected, Dial) => Ok(Connecting),
            (_, Dial) => Err(invalid("Must be disconnected to dial")),

            (Connecting, Opened) => Ok(Open),
            (_, Opened) => Err(invalid("No handshake in progress")),

            (Connecting, Failed) => Ok(Disconnected),
            (_, Failed) => Err(invalid("No handshake in progress")),

            (Open, Dropped) => Ok(Disconnected),
            (_, Dropped) => Err(invalid("Not open")),

            (Connecting | Open, Close) => Ok(Closing),
            (Closing, Close) => Err(invalid("Already closing")),
            (Disconnected, Close) => Err(invalid("Already disconnected")),

            (Closing, Closed) => Ok(Disconnected),
            (_, Closed) => Err(invalid("Not closing")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(events: &[LinkEvent]) -> Result<ConnectionState, InvalidTransition> {
        let mut link = LinkState::new();
        for event in events {
            link.apply_mut(*event)?;
        }
        Ok(link.state())
    }

    #[test]
    fn test_happy_path() {
        use LinkEvent::*;
        assert_eq!(walk(&[Dial]).unwrap(), ConnectionState::Connecting);
        assert_eq!(walk(&[Dial, Opened]).unwrap(), ConnectionState::Open);
        assert_eq!(
            walk(&[Dial, Opened, Close, Closed]).unwrap(),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn test_unsolicited_close() {
        use LinkEvent::*;
        assert_eq!(
            walk(&[Dial, Opened, Dropped, Dial, Opened]).unwrap(),
            ConnectionState::Open
        );
        assert_eq!(walk(&[Dial, Failed]).unwrap(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_invalid_transitions() {
        use LinkEvent::*;
        let err = walk(&[Dial, Opened, Dial]).unwrap_err();
        assert_eq!(err.from, ConnectionState::Open);
        assert_eq!(err.event, Dial);

        assert!(walk(&[Close]).is_err());
        assert!(walk(&[Dropped]).is_err());
        assert!(walk(&[Dial, Dropped]).is_err());
        assert!(walk(&[Dial, Opened, Close, Dropped]).is_err());
    }

    #[test]
    fn test_failed_transition_leaves_state_unchanged() {
        let mut link = LinkState::new();
        link.apply_mut(LinkEvent::Dial).unwrap();
        assert!(link.apply_mut(LinkEvent::Closed).is_err());
        assert_eq!(link.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        let err = walk(&[LinkEvent::Close]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transition from disconnected via Close: Already disconnected"
        );
    }
}
