//! Oracle Registration
//!
//! Handles the registration handshake with the oracle socket.
//!
//! # Registration Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Send `{"type":"register","manifest":{...,"token":"..."}}`
//! 3. Receive `{"type":"register_ack","status":...}`
//! 4. `status == "unauthorized"`: terminal, close with code 4001
//! 5. Any other status: registered
//!
//! The server may also send `ping` before the ack; pongs carry the client id
//! computed here.

use thiserror::Error;

use super::messages::{Manifest, OutboundFrame, RegisterAck};

// =============================================================================
// Constants
// =============================================================================

/// Realm this client registers into.
pub const DEFAULT_REALM: &str = "terra";

/// Role used when none is configured.
pub const DEFAULT_ROLE: &str = "monitor";

/// Close code sent after an unauthorized ack.
pub const UNAUTHORIZED_CLOSE_CODE: u16 = 4001;

/// Close reason sent after an unauthorized ack.
pub const UNAUTHORIZED_CLOSE_REASON: &str = "Unauthorized";

// =============================================================================
// Error Types
// =============================================================================

/// Errors building an auth context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Token is absent or blank.
    #[error("missing auth token")]
    MissingToken,

    /// User id is absent or blank.
    #[error("missing user id")]
    MissingUserId,
}

// =============================================================================
// Auth Context
// =============================================================================

/// Pre-obtained credentials used to register.
///
/// The `Debug` implementation redacts the token for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    token: String,
    user_id: String,
    role: String,
}

impl AuthContext {
    /// Create a new auth context.
    ///
    /// A blank role falls back to `monitor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token or user id is blank.
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        role: Option<String>,
    ) -> Result<Self, AuthError> {
        let token = token.into().trim().to_string();
        let user_id = user_id.into().trim().to_string();

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if user_id.is_empty() {
            return Err(AuthError::MissingUserId);
        }

        let role = role
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());

        Ok(Self {
            token,
            user_id,
            role,
        })
    }

    /// Get the bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Outcome of a `register_ack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Registered; carries the server's view of the client id.
    Accepted {
        /// Client id echoed by the server, if any.
        client_id: Option<String>,
    },
    /// Refused. Do not reconnect.
    Rejected,
}

/// Builds registration frames for one auth context.
#[derive(Debug, Clone)]
pub struct Registration {
    auth: AuthContext,
    realm: String,
}

impl Registration {
    /// Create a registration in the default realm.
    #[must_use]
    pub fn new(auth: AuthContext) -> Self {
        Self {
            auth,
            realm: DEFAULT_REALM.to_string(),
        }
    }

    /// Client id, `{user_id}-{realm}`.
    #[must_use]
    pub fn client_id(&self) -> String {
        format!("{}-{}", self.auth.user_id(), self.realm)
    }

    /// Manifest describing this client.
    #[must_use]
    pub fn manifest(&self) -> Manifest {
        Manifest {
            id: self.client_id(),
            name: "Monitor".to_string(),
            role: self.auth.role().to_string(),
            realm: self.realm.clone(),
            description: "Monitor Client".to_string(),
            host: self.realm.clone(),
            token: self.auth.token().to_string(),
        }
    }

    /// The `register` frame.
    #[must_use]
    pub fn register_frame(&self) -> OutboundFrame {
        OutboundFrame::Register {
            manifest: self.manifest(),
        }
    }

    /// The `pong` reply to a server ping.
    #[must_use]
    pub fn pong_frame(&self) -> OutboundFrame {
        OutboundFrame::Pong {
            client_id: self.client_id(),
        }
    }

    /// Interpret an acknowledgment.
    #[must_use]
    pub fn on_ack(ack: &RegisterAck) -> AckOutcome {
        if ack.is_unauthorized() {
            AckOutcome::Rejected
        } else {
            AckOutcome::Accepted {
                client_id: ack.client_id.clone(),
            }
        }
    }
}
