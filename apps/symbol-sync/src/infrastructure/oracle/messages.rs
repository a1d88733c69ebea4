//! Oracle WebSocket Message Types
//!
//! Wire format types for the oracle socket. Every frame is a JSON object with
//! a `type` discriminator.
//!
//! # Message Types
//!
//! ## Control (handled by the connection)
//! - `register` / `register_ack`: registration handshake
//! - `ping` / `pong`: server-driven heartbeat
//!
//! ## Symbol Universe
//! - `symbols_upsert` / `symbols_delete`: doorbells carrying a target cursor
//! - `symbols_invalidate` (and aliases): removal list or universe bump
//!
//! ## Auxiliary Streams
//! - `hydration_request` / `hydration_response`: news and filings replace
//! - `news_delta` / `filing_delta`: single-item appends
//! - `session_update`: session state patch

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::feed::FeedItem;

// =============================================================================
// Outbound
// =============================================================================

/// Registration manifest describing this client.
///
/// # Wire Format (JSON)
/// ```json
/// {"id": "u1-terra", "name": "Monitor", "role": "monitor", "realm": "terra",
///  "description": "Monitor Client", "host": "terra", "token": "..."}
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Client id, `{user_id}-{realm}`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Client role.
    pub role: String,
    /// Realm the client belongs to.
    pub realm: String,
    /// Free-form description.
    pub description: String,
    /// Host label.
    pub host: String,
    /// Bearer token.
    pub token: String,
}

impl std::fmt::Debug for Manifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("realm", &self.realm)
            .field("host", &self.host)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Frames this client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// `{"type": "register", "manifest": {...}}`
    Register {
        /// Client manifest.
        manifest: Manifest,
    },
    /// `{"type": "pong", "client_id": "..."}`
    Pong {
        /// Registered client id.
        client_id: String,
    },
    /// `{"type": "hydration_request"}`
    HydrationRequest,
}

impl OutboundFrame {
    /// Serialize to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Registration acknowledgment.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "register_ack", "status": "ok", "client_id": "u1-terra"}
/// {"type": "register_ack", "status": "unauthorized"}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegisterAck {
    /// Outcome reported by the server.
    #[serde(default)]
    pub status: Option<String>,
    /// Client id as registered by the server.
    #[serde(default)]
    pub client_id: Option<String>,
}

impl RegisterAck {
    /// Whether the server refused the registration.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("unauthorized"))
    }
}

/// Which symbol doorbell fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorbellKind {
    /// Symbols were created or changed.
    Upsert,
    /// Symbols were deleted.
    Delete,
}

/// Payload of a `hydration_response`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HydrationPayload {
    /// Recent headlines, newest first.
    #[serde(default)]
    pub headlines: Vec<Value>,
    /// Recent filings, newest first.
    #[serde(default)]
    pub filings: Vec<Value>,
    /// Server-side bookkeeping, logged only.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Server heartbeat.
    Ping,
    /// Registration outcome.
    RegisterAck(RegisterAck),
    /// The op log advanced; pull up to `cursor`.
    SymbolDoorbell {
        /// Upsert or delete.
        kind: DoorbellKind,
        /// Target cursor (absent if the frame carried no usable number).
        cursor: Option<u64>,
    },
    /// Symbols were invalidated.
    SymbolInvalidate {
        /// Tickers to drop; empty means the whole universe changed.
        items: Vec<String>,
        /// Universe version, informational.
        version: Option<Value>,
    },
    /// Replacement set of headlines and filings.
    HydrationResponse(HydrationPayload),
    /// One new headline.
    NewsDelta(FeedItem),
    /// One new filing.
    FilingDelta(FeedItem),
    /// Session state patch.
    SessionUpdate(Map<String, Value>),
    /// Frame type this client does not handle.
    Unknown {
        /// Original `type` value.
        kind: String,
    },
}

impl InboundFrame {
    /// Short name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::RegisterAck(_) => "register_ack",
            Self::SymbolDoorbell { .. } => "symbol_doorbell",
            Self::SymbolInvalidate { .. } => "symbol_invalidate",
            Self::HydrationResponse(_) => "hydration_response",
            Self::NewsDelta(_) => "news_delta",
            Self::FilingDelta(_) => "filing_delta",
            Self::SessionUpdate(_) => "session_update",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> Manifest {
        Manifest {
            id: "u1-terra".to_string(),
            name: "Monitor".to_string(),
            role: "monitor".to_string(),
            realm: "terra".to_string(),
            description: "Monitor Client".to_string(),
            host: "terra".to_string(),
            token: "secret-token".to_string(),
        }
    }

    #[test]
    fn register_frame_wire_shape() {
        let frame = OutboundFrame::Register {
            manifest: manifest(),
        };
        let value: Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "register");
        assert_eq!(value["manifest"]["id"], "u1-terra");
        assert_eq!(value["manifest"]["token"], "secret-token");
    }

    #[test]
    fn pong_and_hydration_request_wire_shape() {
        let pong = OutboundFrame::Pong {
            client_id: "u1-terra".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&pong).unwrap(),
            json!({"type": "pong", "client_id": "u1-terra"})
        );
        assert_eq!(
            serde_json::to_value(OutboundFrame::HydrationRequest).unwrap(),
            json!({"type": "hydration_request"})
        );
    }

    #[test]
    fn manifest_debug_redacts_token() {
        let debug = format!("{:?}", manifest());
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn ack_status_is_case_insensitive() {
        let ack = RegisterAck {
            status: Some("Unauthorized".to_string()),
            client_id: None,
        };
        assert!(ack.is_unauthorized());
        assert!(!RegisterAck::default().is_unauthorized());
    }
}
