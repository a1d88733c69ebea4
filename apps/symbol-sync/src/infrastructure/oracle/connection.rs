//! Oracle Connection Manager
//!
//! Owns the long-lived oracle WebSocket: connect, register, answer server
//! pings, hand frames to the dispatcher, and reconnect after a fixed delay.
//!
//! # Lifecycle
//!
//! ```text
//! open() --> Connecting --> Open --register--> Registering --ack--> Registered
//!                ^                                  |                   |
//!                |                          unauthorized           close/error
//!                |                                  v                   |
//!                |                        PermanentlyRejected           |
//!                +---------- sleep(delay) <-- Disconnected <------------+
//! ```
//!
//! A rejected manager never connects again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, FrameCodec};
use super::dispatcher::Dispatcher;
use super::messages::{InboundFrame, OutboundFrame};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::registration::{
    AckOutcome, AuthContext, AuthError, Registration, UNAUTHORIZED_CLOSE_CODE,
    UNAUTHORIZED_CLOSE_REASON,
};
use crate::application::services::{EventHub, ResyncCoordinator};
use crate::domain::connection::ConnectionState;
use crate::domain::events::SyncEvent;
use crate::infrastructure::metrics;

/// Default oracle socket URL.
pub const DEFAULT_ORACLE_WS_URL: &str = "wss://oracle.arcanemonitor.com:8443/ws";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Auth context is incomplete; nothing was attempted.
    #[error("missing auth: {0}")]
    MissingAuth(#[from] AuthError),

    /// This manager was rejected by the server and will not connect again.
    #[error("registration permanently rejected")]
    PermanentlyRejected,

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Outbound frame could not be serialized.
    #[error("frame encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    /// Create a configuration with the default fixed reconnect delay.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ORACLE_WS_URL)
    }
}

/// The connection loop currently owned by the manager.
struct Session {
    id: u64,
    cancel: CancellationToken,
}

/// How a single socket session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Server closed or the stream ended.
    Closed,
    /// Registration refused.
    Rejected,
    /// Local shutdown.
    Cancelled,
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Oracle socket lifecycle manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    codec: FrameCodec,
    dispatcher: Arc<Dispatcher>,
    resync: Arc<ResyncCoordinator>,
    events: EventHub,
    state: RwLock<ConnectionState>,
    rejected: AtomicBool,
    attempts: AtomicU32,
    shutdown: CancellationToken,
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager. `shutdown` cancels every connection loop it starts.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        dispatcher: Arc<Dispatcher>,
        resync: Arc<ResyncCoordinator>,
        events: EventHub,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: FrameCodec::new(),
            dispatcher,
            resync,
            events,
            state: RwLock::new(ConnectionState::Disconnected),
            rejected: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            shutdown,
            session: Mutex::new(None),
            next_session: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Total connection attempts made by this manager.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Whether the server refused registration.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejected.load(Ordering::Acquire)
    }

    /// Start the connection loop in the background.
    ///
    /// A no-op if a loop is already running. A loop that was closed but has
    /// not wound down yet does not count: a fresh one is started.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::PermanentlyRejected` if this manager was
    /// rejected before.
    pub fn open(self: &Arc<Self>, auth: AuthContext) -> Result<(), ConnectionError> {
        if self.is_rejected() {
            tracing::warn!("Not connecting: registration was rejected");
            return Err(ConnectionError::PermanentlyRejected);
        }

        let (id, cancel) = {
            let mut session = self.session.lock();
            if session.as_ref().is_some_and(|s| !s.cancel.is_cancelled()) {
                tracing::debug!("Connection loop already running");
                return Ok(());
            }
            let id = self.next_session.fetch_add(1, Ordering::AcqRel);
            let cancel = self.shutdown.child_token();
            *session = Some(Session {
                id,
                cancel: cancel.clone(),
            });
            (id, cancel)
        };

        let this = Arc::clone(self);
        let registration = Registration::new(auth);
        tokio::spawn(async move {
            this.run(id, registration, cancel).await;
            this.release(id);
        });
        Ok(())
    }

    fn is_current(&self, id: u64) -> bool {
        self.session.lock().as_ref().is_some_and(|s| s.id == id)
    }

    fn release(&self, id: u64) {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| s.id == id) {
            *session = None;
        }
    }

    /// Build an auth context and open.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::MissingAuth` without connecting if the token
    /// or user id is absent or blank.
    pub fn open_with(
        self: &Arc<Self>,
        token: Option<&str>,
        user_id: Option<&str>,
        role: Option<String>,
    ) -> Result<(), ConnectionError> {
        let auth = AuthContext::new(token.unwrap_or_default(), user_id.unwrap_or_default(), role)
            .inspect_err(|e| tracing::error!(error = %e, "Cannot connect: missing auth"))?;
        self.open(auth)
    }

    /// Stop the connection loop. No reconnect follows.
    pub fn close(&self) {
        if let Some(session) = self.session.lock().take() {
            session.cancel.cancel();
        }
        if !self.state().is_terminal() {
            self.transition(ConnectionState::Disconnected);
        }
    }

    async fn run(&self, id: u64, registration: Registration, cancel: CancellationToken) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.attempts.fetch_add(1, Ordering::AcqRel);
            let outcome = self
                .connect_and_run(&registration, &cancel, &mut policy)
                .await;

            match outcome {
                Ok(SessionEnd::Cancelled) => {
                    tracing::info!("Oracle connection closed by shutdown");
                    // After close() a newer loop may already own the state.
                    if self.is_current(id) {
                        self.transition(ConnectionState::Disconnected);
                    }
                    break;
                }
                Ok(SessionEnd::Rejected) => {
                    tracing::warn!("Will not reconnect after rejection");
                    break;
                }
                Ok(SessionEnd::Closed) => tracing::warn!("Oracle connection closed"),
                Err(e) => tracing::warn!(error = %e, "Oracle connection error"),
            }

            if self.is_rejected() {
                break;
            }
            self.transition(ConnectionState::Disconnected);

            let Some(delay) = policy.next_delay() else {
                tracing::error!(
                    attempts = policy.attempt_count(),
                    "Maximum reconnection attempts exceeded"
                );
                break;
            };
            tracing::info!(delay_ms = delay.as_millis(), "Reconnecting to oracle");
            metrics::record_reconnect();

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Oracle connection cancelled during reconnect delay");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_and_run(
        &self,
        registration: &Registration,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> Result<SessionEnd, ConnectionError> {
        self.transition(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to oracle");

        let connect = tokio_tungstenite::connect_async(self.config.url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            result = connect => result?,
        };
        self.transition(ConnectionState::Open);

        let (mut write, mut read) = ws_stream.split();

        tracing::info!(client_id = %registration.client_id(), "Connected; registering");
        send_frame(&mut write, &registration.register_frame()).await?;
        self.transition(ConnectionState::Registering);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                msg = read.next() => {
                    let decoded = match msg {
                        Some(Ok(Message::Text(text))) => self.codec.decode(text.as_str()),
                        Some(Ok(Message::Binary(data))) => self.codec.decode_bytes(&data),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server sent close frame");
                            return Ok(SessionEnd::Closed);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Ok(SessionEnd::Closed);
                        }
                    };

                    if let Some(end) = self
                        .handle_frame(decoded, registration, &mut write, policy)
                        .await?
                    {
                        return Ok(end);
                    }
                }
            }
        }
    }

    async fn handle_frame<W>(
        &self,
        decoded: Result<InboundFrame, CodecError>,
        registration: &Registration,
        write: &mut W,
        policy: &mut ReconnectPolicy,
    ) -> Result<Option<SessionEnd>, ConnectionError>
    where
        W: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                metrics::record_frame_dropped("malformed");
                return Ok(None);
            }
        };
        metrics::record_frame_received(frame.name());

        match frame {
            InboundFrame::Ping => {
                send_frame(write, &registration.pong_frame()).await?;
            }
            InboundFrame::RegisterAck(ack) => match Registration::on_ack(&ack) {
                AckOutcome::Rejected if self.state() != ConnectionState::Registering => {
                    tracing::warn!(
                        state = %self.state(),
                        "Ignoring unauthorized ack outside registration"
                    );
                    metrics::record_frame_dropped("stray_ack");
                }
                AckOutcome::Rejected => {
                    tracing::warn!("Registration rejected: unauthorized");
                    self.rejected.store(true, Ordering::Release);
                    self.transition(ConnectionState::PermanentlyRejected);
                    self.events.publish(SyncEvent::Rejected);

                    let close = CloseFrame {
                        code: CloseCode::from(UNAUTHORIZED_CLOSE_CODE),
                        reason: UNAUTHORIZED_CLOSE_REASON.into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(close))).await {
                        tracing::debug!(error = %e, "Close after rejection failed");
                    }
                    return Ok(Some(SessionEnd::Rejected));
                }
                AckOutcome::Accepted { client_id } => {
                    tracing::info!(?client_id, "Registered with oracle");
                    self.transition(ConnectionState::Registered);
                    policy.reset();

                    send_frame(write, &OutboundFrame::HydrationRequest).await?;
                    self.resync.request_hydration();
                }
            },
            other => {
                let route = self.dispatcher.on_frame(other);
                tracing::trace!(?route, "Frame routed");
            }
        }

        Ok(None)
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.write();
        let from = *state;
        if from == next {
            return false;
        }
        if !from.can_transition_to(next) {
            tracing::debug!(%from, to = %next, "Ignoring invalid state transition");
            return false;
        }
        *state = next;
        drop(state);

        tracing::debug!(%from, to = %next, "Connection state changed");
        self.events
            .publish(SyncEvent::ConnectionChanged { from, to: next });
        true
    }
}

async fn send_frame<W>(write: &mut W, frame: &OutboundFrame) -> Result<(), ConnectionError>
where
    W: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = frame.to_json()?;
    write.send(Message::Text(json.into())).await?;
    Ok(())
}
