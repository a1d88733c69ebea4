//! Mirror Port (Driven Port)
//!
//! The local copy of the oracle's data. The engine mutates it; the
//! presentation layer reads it.

use crate::domain::feed::FeedItem;
use crate::domain::symbol::SymbolRecord;

/// Local mirror of the symbol universe and its auxiliary feeds.
///
/// Implementations must be cheap to call from async code: every method is
/// synchronous and should not block on I/O.
pub trait Mirror: Send + Sync {
    /// Replace the full symbol universe with `items`, consistent with op-log
    /// version `version`.
    fn apply_full(&self, items: Vec<SymbolRecord>, version: u64);

    /// Create or field-merge each record (last value wins per field).
    fn upsert(&self, items: Vec<SymbolRecord>);

    /// Delete the given tickers. Unknown tickers are ignored.
    fn remove(&self, symbols: &[String]);

    /// Attach a headline to one symbol.
    fn attach_news(&self, item: &FeedItem, symbol: &str);

    /// Attach a filing to one symbol.
    fn attach_filing(&self, item: &FeedItem, symbol: &str);

    /// Drop every attached headline.
    fn clear_news(&self);

    /// Drop every attached filing.
    fn clear_filings(&self);

    /// Signal that the auxiliary feeds finished hydrating.
    fn mark_hydration_complete(&self);
}
