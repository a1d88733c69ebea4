//! News and Filing Feeds
//!
//! Headline and filing documents streamed alongside the symbol universe, a
//! bounded newest-first buffer for recent items, and the recursive merge used
//! for session state.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::{Map, Value};

use super::symbol::normalize_symbol;

/// Which auxiliary stream an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// News headlines.
    News,
    /// Regulatory filings.
    Filing,
}

impl FeedKind {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Filing => "filing",
        }
    }
}

/// A headline or filing document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeedItem(pub Value);

impl FeedItem {
    /// Wrap a raw document.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Tickers the item references, normalized and deduplicated in order.
    ///
    /// Reads the `symbols` array; falls back to a single `symbol` string.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |raw: &str| {
            if let Some(sym) = normalize_symbol(raw)
                && !out.contains(&sym)
            {
                out.push(sym);
            }
        };

        match self.0.get("symbols") {
            Some(Value::Array(list)) if !list.is_empty() => {
                list.iter().filter_map(Value::as_str).for_each(&mut push);
            }
            _ => {
                if let Some(single) = self.0.get("symbol").and_then(Value::as_str) {
                    push(single);
                }
            }
        }
        out
    }

    /// Borrow the raw document.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

// =============================================================================
// Rolling Buffer
// =============================================================================

/// Bounded newest-first buffer. Pushing past capacity evicts the oldest item.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingBuffer<T> {
    /// Create an empty buffer. A capacity of 0 is raised to 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Prepend an item, evicting from the back when full.
    pub fn push_front(&mut self, item: T) {
        self.items.push_front(item);
        while self.items.len() > self.capacity {
            self.items.pop_back();
        }
    }

    /// Replace the contents, keeping at most `capacity` items from the front.
    pub fn replace(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.clear();
        self.items.extend(items.into_iter().take(self.capacity));
    }

    /// Drop every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items retained.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

// =============================================================================
// Field Merge
// =============================================================================

/// Merge `patch` into `target`: nested objects merge recursively, any other
/// value replaces what was there.
pub fn merge_fields(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, incoming) in patch {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_fields(existing, nested);
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}
