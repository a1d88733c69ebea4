//! Connection Lifecycle State
//!
//! State machine for the oracle socket:
//!
//! ```text
//! Disconnected -> Connecting -> Open -> Registering -> Registered
//!                                            |
//!                                            +-> PermanentlyRejected (terminal)
//! ```
//!
//! Every non-terminal state may fall back to `Disconnected` on a transport
//! failure.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the oracle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket.
    #[default]
    Disconnected,
    /// TCP/TLS/WebSocket handshake in progress.
    Connecting,
    /// Socket open, registration not yet sent.
    Open,
    /// Registration sent, awaiting `register_ack`.
    Registering,
    /// Registration accepted; frames flow.
    Registered,
    /// Registration rejected as unauthorized. Terminal.
    PermanentlyRejected,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{
            Connecting, Disconnected, Open, PermanentlyRejected, Registered, Registering,
        };

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting | Open | Registering | Registered, Disconnected)
                | (Connecting, Open)
                | (Open, Registering)
                | (Registering, Registered | PermanentlyRejected)
        )
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::PermanentlyRejected)
    }

    /// Whether frames can be exchanged with the server.
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Registered)
    }

    /// Stable lowercase name for logs, metrics and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::PermanentlyRejected => "permanently_rejected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ConnectionState::Disconnected, ConnectionState::Connecting, true)]
    #[test_case(ConnectionState::Connecting, ConnectionState::Open, true)]
    #[test_case(ConnectionState::Open, ConnectionState::Registering, true)]
    #[test_case(ConnectionState::Registering, ConnectionState::Registered, true)]
    #[test_case(ConnectionState::Registering, ConnectionState::PermanentlyRejected, true)]
    #[test_case(ConnectionState::Registered, ConnectionState::Disconnected, true)]
    #[test_case(ConnectionState::Open, ConnectionState::Disconnected, true)]
    #[test_case(ConnectionState::Disconnected, ConnectionState::Registered, false)]
    #[test_case(ConnectionState::Open, ConnectionState::PermanentlyRejected, false)]
    #[test_case(ConnectionState::Registered, ConnectionState::PermanentlyRejected, false)]
    #[test_case(ConnectionState::PermanentlyRejected, ConnectionState::Disconnected, false)]
    #[test_case(ConnectionState::PermanentlyRejected, ConnectionState::Connecting, false)]
    fn transitions(from: ConnectionState, to: ConnectionState, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_rejection_is_terminal() {
        assert!(ConnectionState::PermanentlyRejected.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::Registered.is_terminal());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(
            ConnectionState::PermanentlyRejected.to_string(),
            "permanently_rejected"
        );
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
