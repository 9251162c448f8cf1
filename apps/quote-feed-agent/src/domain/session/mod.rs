//! Feed Session State Machine
//!
//! `Uninitialized → Connecting → Connected → Closed`
//!
//! The agent only initiates the connection and tears it down. The
//! `Connecting → Connected` edge (and the fall back to `Connecting` while the
//! client reconnects) is driven by events reported by the feed client.

use serde::Serialize;

/// Lifecycle state of the single upstream feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session not started yet.
    #[default]
    Uninitialized,
    /// Connection initiated, waiting for the client to report success.
    Connecting,
    /// Client reported an established connection.
    Connected,
    /// Session released at shutdown. Terminal.
    Closed,
}

/// Inputs that move the session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Agent startup initiated the connection.
    Start,
    /// Feed client reported a successful connection.
    Connected,
    /// Feed client lost the connection and is reconnecting.
    Disconnected,
    /// Agent shutdown.
    Shutdown,
}

impl SessionState {
    /// Apply an event.
    ///
    /// Returns the next state, or `None` if the event is not valid in the
    /// current state.
    #[must_use]
    pub const fn transition(self, event: SessionEvent) -> Option<Self> {
        match (self, event) {
            (Self::Closed, _) => None,
            (_, SessionEvent::Shutdown) => Some(Self::Closed),
            (Self::Uninitialized, SessionEvent::Start) => Some(Self::Connecting),
            (Self::Connecting | Self::Connected, SessionEvent::Connected) => Some(Self::Connected),
            (Self::Connecting | Self::Connected, SessionEvent::Disconnected) => {
                Some(Self::Connecting)
            }
            _ => None,
        }
    }

    /// Check if upstream calls may still be forwarded.
    #[must_use]
    pub const fn accepts_calls(self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }

    /// Position in the state machine, used as a gauge value.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Closed => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let state = SessionState::default();
        let state = state.transition(SessionEvent::Start).unwrap();
        assert_eq!(state, SessionState::Connecting);
        let state = state.transition(SessionEvent::Connected).unwrap();
        assert_eq!(state, SessionState::Connected);
        let state = state.transition(SessionEvent::Shutdown).unwrap();
        assert_eq!(state, SessionState::Closed);
    }

    #[test]
    fn cannot_connect_before_start() {
        assert_eq!(
            SessionState::Uninitialized.transition(SessionEvent::Connected),
            None
        );
    }

    #[test]
    fn start_only_from_uninitialized() {
        assert_eq!(SessionState::Connecting.transition(SessionEvent::Start), None);
        assert_eq!(SessionState::Connected.transition(SessionEvent::Start), None);
    }

    #[test]
    fn disconnect_falls_back_to_connecting() {
        assert_eq!(
            SessionState::Connected.transition(SessionEvent::Disconnected),
            Some(SessionState::Connecting)
        );
    }

    #[test]
    fn closed_is_terminal() {
        for event in [
            SessionEvent::Start,
            SessionEvent::Connected,
            SessionEvent::Disconnected,
            SessionEvent::Shutdown,
        ] {
            assert_eq!(SessionState::Closed.transition(event), None);
        }
        assert!(!SessionState::Closed.accepts_calls());
    }

    #[test]
    fn shutdown_from_any_open_state() {
        for state in [
            SessionState::Uninitialized,
            SessionState::Connecting,
            SessionState::Connected,
        ] {
            assert_eq!(
                state.transition(SessionEvent::Shutdown),
                Some(SessionState::Closed)
            );
        }
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionState::Connected).unwrap(),
            "\"connected\""
        );
    }
}
