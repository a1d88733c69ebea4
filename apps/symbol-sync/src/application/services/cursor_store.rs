//! Cursor Store
//!
//! Persisted monotonic watermark of the highest applied op version.
//!
//! Reads are served from memory. Writes are buffered in a `WriteCoalescer`
//! and flushed to the `KeyValueStore` on a short interval, so a burst of
//! cursor advances during catch-up costs a single disk write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::application::ports::{KeyValueStore, StoreError};
use crate::domain::symbol::value_as_u64;

/// Storage key of the cursor.
pub const CURSOR_KEY: &str = "symbols.lastAckCursor";

/// Default coalescing interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Write Coalescer
// =============================================================================

/// Buffers key-value writes and flushes them in batches.
///
/// A flush is scheduled on the first write after an idle period and re-armed
/// only while writes remain pending. Failed writes stay pending (newer values
/// for the same key win) and are retried on the next flush.
pub struct WriteCoalescer {
    store: Arc<dyn KeyValueStore>,
    pending: Mutex<Map<String, Value>>,
    scheduled: AtomicBool,
    write_lock: Mutex<()>,
    interval: Duration,
}

impl std::fmt::Debug for WriteCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCoalescer")
            .field("pending", &self.pending.lock().len())
            .field("scheduled", &self.scheduled.load(Ordering::Relaxed))
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl WriteCoalescer {
    /// Create a coalescer in front of `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            pending: Mutex::new(Map::new()),
            scheduled: AtomicBool::new(false),
            write_lock: Mutex::new(()),
            interval,
        })
    }

    /// Buffer a write and make sure a flush is scheduled.
    pub fn set(self: &Arc<Self>, key: &str, value: Value) {
        self.pending.lock().insert(key.to_string(), value);
        self.schedule();
    }

    /// Whether any write is waiting to be flushed.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Arm a flush after the coalescing interval.
    ///
    /// Outside a tokio runtime there is nothing to defer to, so the pending
    /// writes are flushed immediately.
    pub fn schedule(self: &Arc<Self>) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.scheduled.store(false, Ordering::Release);
            if let Err(e) = self.flush_sync() {
                tracing::warn!(error = %e, "Cursor write failed; value kept pending");
            }
            return;
        };

        let this = Arc::clone(self);
        handle.spawn(async move {
            tokio::time::sleep(this.interval).await;
            this.scheduled.store(false, Ordering::Release);
            if let Err(e) = this.flush().await {
                tracing::warn!(error = %e, "Cursor write failed; retrying");
            }
            if this.has_pending() {
                this.schedule();
            }
        });
    }

    /// Write every pending entry without blocking the async runtime.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the entries stay pending.
    pub async fn flush(self: &Arc<Self>) -> Result<(), StoreError> {
        if !self.has_pending() {
            return Ok(());
        }
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.flush_sync())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Write every pending entry on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the entries stay pending.
    pub fn flush_sync(&self) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();

        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(());
        }

        self.store.set_many(&batch).inspect_err(|_| {
            let mut pending = self.pending.lock();
            for (key, value) in batch {
                pending.entry(key).or_insert(value);
            }
        })
    }
}

// =============================================================================
// Cursor Store
// =============================================================================

/// Monotonic cursor backed by a coalesced key-value store.
#[derive(Debug)]
pub struct CursorStore {
    current: Mutex<u64>,
    coalescer: Arc<WriteCoalescer>,
}

impl CursorStore {
    /// Load the cursor from `store`, starting at 0 when absent or invalid.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, flush_interval: Duration) -> Self {
        let initial = match store.get(CURSOR_KEY) {
            None => 0,
            Some(value) => value_as_u64(&value).unwrap_or_else(|| {
                tracing::warn!(%value, "Stored cursor is not a valid version; starting at 0");
                0
            }),
        };
        tracing::info!(cursor = initial, "Cursor loaded");

        Self {
            current: Mutex::new(initial),
            coalescer: WriteCoalescer::new(store, flush_interval),
        }
    }

    /// Current cursor.
    #[must_use]
    pub fn get(&self) -> u64 {
        *self.current.lock()
    }

    /// Advance the cursor to `value`.
    ///
    /// No-op (returns `false`) when `value` does not exceed the current
    /// cursor.
    pub fn set(&self, value: u64) -> bool {
        let mut current = self.current.lock();
        if value <= *current {
            return false;
        }
        *current = value;
        self.coalescer.set(CURSOR_KEY, Value::from(value));
        drop(current);
        true
    }

    /// Force the cursor back to 0, bypassing the monotonic guard.
    ///
    /// Operator tooling only; the engine never calls this.
    pub fn reset(&self) {
        let mut current = self.current.lock();
        *current = 0;
        self.coalescer.set(CURSOR_KEY, Value::from(0_u64));
        drop(current);
        tracing::warn!("Cursor reset to 0");
    }

    /// Durably write any pending value.
    ///
    /// # Errors
    ///
    /// Returns the storage error; the value stays pending.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.coalescer.flush().await
    }

    /// Durably write any pending value on the calling thread (shutdown path).
    ///
    /// # Errors
    ///
    /// Returns the storage error; the value stays pending.
    pub fn flush_sync(&self) -> Result<(), StoreError> {
        self.coalescer.flush_sync()
    }

    /// Whether a value is waiting to be written.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.coalescer.has_pending()
    }
}
