//! In-Memory Mirror
//!
//! Reference `Mirror` implementation: the symbol universe plus per-symbol
//! headline and filing lists, behind one `RwLock`.
//!
//! Upserts merge field by field (last value wins per field); a full apply
//! replaces everything. Attached feed items are kept newest first, at most
//! `feed_capacity` per symbol.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;

use crate::application::ports::Mirror;
use crate::domain::feed::FeedItem;
use crate::domain::symbol::{SymbolDoc, SymbolRecord};
use crate::infrastructure::oracle::DEFAULT_FEED_CAPACITY;

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Default)]
struct MirrorState {
    symbols: HashMap<String, SymbolDoc>,
    version: u64,
    news: HashMap<String, VecDeque<FeedItem>>,
    filings: HashMap<String, VecDeque<FeedItem>>,
    feeds_hydrated: bool,
}

/// Point-in-time counts for health output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MirrorStats {
    /// Symbols held.
    pub symbols: usize,
    /// Version of the last full apply.
    pub version: u64,
    /// Attached headlines across all symbols.
    pub news: usize,
    /// Attached filings across all symbols.
    pub filings: usize,
    /// Whether the feeds finished hydrating.
    pub feeds_hydrated: bool,
}

// =============================================================================
// Mirror
// =============================================================================

/// Thread-safe in-memory mirror.
#[derive(Debug)]
pub struct InMemoryMirror {
    state: RwLock<MirrorState>,
    feed_capacity: usize,
}

impl Default for InMemoryMirror {
    fn default() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }
}

impl InMemoryMirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mirror keeping at most `capacity` headlines and
    /// filings per symbol.
    #[must_use]
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(MirrorState::default()),
            feed_capacity: capacity.max(1),
        }
    }

    /// Fields of one symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<SymbolDoc> {
        self.state
            .read()
            .symbols
            .get(&symbol.trim().to_uppercase())
            .cloned()
    }

    /// Number of symbols held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().symbols.len()
    }

    /// Whether no symbols are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().symbols.is_empty()
    }

    /// Tickers held, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.state.read().symbols.keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }

    /// Headlines attached to a symbol, newest first.
    #[must_use]
    pub fn news_for(&self, symbol: &str) -> Vec<FeedItem> {
        self.state
            .read()
            .news
            .get(&symbol.trim().to_uppercase())
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Filings attached to a symbol, newest first.
    #[must_use]
    pub fn filings_for(&self, symbol: &str) -> Vec<FeedItem> {
        self.state
            .read()
            .filings
            .get(&symbol.trim().to_uppercase())
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current counts.
    #[must_use]
    pub fn stats(&self) -> MirrorStats {
        let state = self.state.read();
        MirrorStats {
            symbols: state.symbols.len(),
            version: state.version,
            news: state.news.values().map(VecDeque::len).sum(),
            filings: state.filings.values().map(VecDeque::len).sum(),
            feeds_hydrated: state.feeds_hydrated,
        }
    }
}

impl Mirror for InMemoryMirror {
    fn apply_full(&self, items: Vec<SymbolRecord>, version: u64) {
        let symbols: HashMap<String, SymbolDoc> = items
            .into_iter()
            .map(|record| (record.symbol, record.fields))
            .collect();

        let mut state = self.state.write();
        state.symbols = symbols;
        state.version = version;
        tracing::debug!(symbols = state.symbols.len(), version, "Mirror replaced");
    }

    fn upsert(&self, items: Vec<SymbolRecord>) {
        let mut state = self.state.write();
        for record in items {
            let doc = state.symbols.entry(record.symbol).or_default();
            for (field, value) in record.fields {
                doc.insert(field, value);
            }
        }
    }

    fn remove(&self, symbols: &[String]) {
        let mut state = self.state.write();
        for symbol in symbols {
            let key = symbol.trim().to_uppercase();
            state.symbols.remove(&key);
            state.news.remove(&key);
            state.filings.remove(&key);
        }
    }

    fn attach_news(&self, item: &FeedItem, symbol: &str) {
        let mut state = self.state.write();
        push_newest(&mut state.news, symbol, item, self.feed_capacity);
    }

    fn attach_filing(&self, item: &FeedItem, symbol: &str) {
        let mut state = self.state.write();
        push_newest(&mut state.filings, symbol, item, self.feed_capacity);
    }

    fn clear_news(&self) {
        self.state.write().news.clear();
    }

    fn clear_filings(&self) {
        self.state.write().filings.clear();
    }

    fn mark_hydration_complete(&self) {
        self.state.write().feeds_hydrated = true;
    }
}

fn push_newest(
    feeds: &mut HashMap<String, VecDeque<FeedItem>>,
    symbol: &str,
    item: &FeedItem,
    capacity: usize,
) {
    let items = feeds.entry(symbol.to_string()).or_default();
    items.push_front(item.clone());
    items.truncate(capacity);
}
