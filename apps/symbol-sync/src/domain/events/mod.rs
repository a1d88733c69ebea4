//! Sync Events
//!
//! Progress notifications published to observers (presentation layer,
//! metrics recorder, health endpoint).

use serde::Serialize;

use super::connection::ConnectionState;

/// A notable change in the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Connection moved between lifecycle states.
    ConnectionChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Registration was refused; the connection will not retry.
    Rejected,
    /// A full snapshot hydration began.
    HydrationStarted,
    /// A full snapshot hydration was applied.
    HydrationCompleted {
        /// Items applied to the mirror.
        items: usize,
        /// Cursor after the hydration.
        cursor: u64,
        /// Wall time of the hydration.
        elapsed_ms: u64,
    },
    /// A full snapshot hydration failed; nothing was applied.
    HydrationFailed {
        /// Rendered error.
        error: String,
    },
    /// A catch-up loop began.
    CatchUpStarted {
        /// Cursor when the loop started.
        from: u64,
        /// Requested target.
        target: u64,
    },
    /// One page of ops was applied.
    PageApplied {
        /// Upserts in the page.
        upserts: usize,
        /// Removes in the page.
        removes: usize,
        /// Cursor after the page.
        cursor: u64,
    },
    /// A catch-up loop finished.
    CatchUpCompleted {
        /// Final cursor.
        cursor: u64,
    },
    /// A catch-up loop failed.
    CatchUpFailed {
        /// Rendered error.
        error: String,
    },
    /// The news and filing feeds were replaced from a hydration response.
    FeedHydrated {
        /// Headlines attached.
        headlines: usize,
        /// Filings attached.
        filings: usize,
    },
    /// Session state was merged from a `session_update`.
    SessionUpdated,
}

impl SyncEvent {
    /// Short name used as a metrics label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::Rejected => "rejected",
            Self::HydrationStarted => "hydration_started",
            Self::HydrationCompleted { .. } => "hydration_completed",
            Self::HydrationFailed { .. } => "hydration_failed",
            Self::CatchUpStarted { .. } => "catch_up_started",
            Self::PageApplied { .. } => "page_applied",
            Self::CatchUpCompleted { .. } => "catch_up_completed",
            Self::CatchUpFailed { .. } => "catch_up_failed",
            Self::FeedHydrated { .. } => "feed_hydrated",
            Self::SessionUpdated => "session_updated",
        }
    }
}
