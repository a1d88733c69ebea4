//! Snapshot Hydrator
//!
//! Rebuilds the mirror from a full paged snapshot of the symbol universe.
//!
//! # Pagination
//!
//! A small probe page reveals the snapshot size and cursor. The remaining
//! pages are sized so the whole snapshot arrives in roughly
//! `target_requests` requests, clamped to `[min_page, max_page]`.
//!
//! Nothing is applied until every page has arrived; a failed fetch leaves
//! the mirror and cursor untouched.

use std::sync::Arc;

use serde_json::Value;

use super::cursor_store::CursorStore;
use super::ApplyGate;
use crate::application::ports::{ApiError, Mirror, SymbolApi};
use crate::domain::symbol::SymbolRecord;

/// Page size used when the snapshot reports no items.
pub const FALLBACK_PAGE_SIZE: usize = 2000;

/// Pagination tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationConfig {
    /// Items requested by the probe page.
    pub probe_size: usize,
    /// Number of requests the rest of the snapshot should take.
    pub target_requests: usize,
    /// Smallest page size.
    pub min_page: usize,
    /// Largest page size.
    pub max_page: usize,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            probe_size: 1000,
            target_requests: 4,
            min_page: 500,
            max_page: 10_000,
        }
    }
}

/// Choose the page size for a snapshot of `count` items.
#[must_use]
pub fn pick_page_size(count: usize, config: &HydrationConfig) -> usize {
    if count == 0 {
        return FALLBACK_PAGE_SIZE;
    }
    let target = config.target_requests.max(1);
    let max_page = config.max_page.max(config.min_page);
    count.div_ceil(target).clamp(config.min_page, max_page)
}

/// Hydration error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HydrationError {
    /// A snapshot page could not be fetched.
    #[error("snapshot fetch failed at offset {offset}: {source}")]
    Fetch {
        /// Offset of the failed page.
        offset: usize,
        /// Underlying API error.
        #[source]
        source: ApiError,
    },
}

/// Full snapshot loader.
pub struct Hydrator {
    api: Arc<dyn SymbolApi>,
    mirror: Arc<dyn Mirror>,
    cursor: Arc<CursorStore>,
    config: HydrationConfig,
    gate: ApplyGate,
}

impl Hydrator {
    /// Create a hydrator.
    #[must_use]
    pub fn new(
        api: Arc<dyn SymbolApi>,
        mirror: Arc<dyn Mirror>,
        cursor: Arc<CursorStore>,
        config: HydrationConfig,
        gate: ApplyGate,
    ) -> Self {
        Self {
            api,
            mirror,
            cursor,
            config,
            gate,
        }
    }

    /// Pagination settings.
    #[must_use]
    pub const fn config(&self) -> &HydrationConfig {
        &self.config
    }

    /// Cursor the mirror is currently consistent with.
    #[must_use]
    pub fn current_cursor(&self) -> u64 {
        self.cursor.get()
    }

    /// Fetch the whole snapshot, replace the mirror with it, and advance the
    /// cursor to the snapshot's version.
    ///
    /// Calls are serialized with each other and with delta pull passes.
    ///
    /// # Errors
    ///
    /// Returns `HydrationError::Fetch` if any page fails; nothing is applied.
    pub async fn hydrate_all(&self, probe_size: usize) -> Result<usize, HydrationError> {
        let _gate = self.gate.lock().await;

        let probe = self
            .api
            .fetch_snapshot(probe_size.max(1), 0)
            .await
            .map_err(|source| HydrationError::Fetch { offset: 0, source })?;

        let total = probe.total();
        let version = probe.cursor();
        let page_size = pick_page_size(total, &self.config);
        let mut items: Vec<Value> = probe.items;

        tracing::info!(total, version, page_size, "Hydrating symbol snapshot");

        while items.len() < total {
            let offset = items.len();
            let page = self
                .api
                .fetch_snapshot(page_size, offset)
                .await
                .map_err(|source| HydrationError::Fetch { offset, source })?;

            if page.items.is_empty() {
                tracing::warn!(offset, total, "Snapshot ended early");
                break;
            }
            tracing::debug!(offset, received = page.items.len(), "Snapshot page");
            items.extend(page.items);
        }

        let fetched = items.len();
        let records: Vec<SymbolRecord> = items
            .into_iter()
            .filter_map(SymbolRecord::from_value)
            .collect();
        if records.len() < fetched {
            tracing::warn!(
                dropped = fetched - records.len(),
                "Snapshot items without a symbol were dropped"
            );
        }

        let applied = records.len();
        let local = self.cursor.get();
        if version < local {
            tracing::warn!(version, local, "Snapshot is older than the local cursor");
        }
        self.mirror.apply_full(records, version);
        self.cursor.set(version);

        tracing::info!(applied, cursor = self.cursor.get(), "Snapshot applied");
        Ok(applied)
    }
}
