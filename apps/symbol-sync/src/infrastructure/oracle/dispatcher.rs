//! Frame Dispatcher
//!
//! Routes decoded oracle frames to the service that owns them. Catch-up and
//! resync work is spawned so the socket read loop never waits on the REST
//! API.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};

use super::messages::{HydrationPayload, InboundFrame};
use crate::application::ports::Mirror;
use crate::application::services::{DeltaPuller, EventHub, ResyncCoordinator};
use crate::domain::events::SyncEvent;
use crate::domain::feed::{FeedItem, FeedKind, RollingBuffer, merge_fields};

/// Default capacity of each recent-items buffer.
pub const DEFAULT_FEED_CAPACITY: usize = 1000;

/// What the dispatcher did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRoute {
    /// A coalesced catch-up toward `target` was requested.
    CatchUp {
        /// Doorbell cursor.
        target: u64,
    },
    /// Listed symbols were removed from the mirror.
    Removed {
        /// Number of tickers removed.
        count: usize,
    },
    /// A full resync was requested.
    Resync,
    /// News and filings were replaced.
    FeedReplaced {
        /// Headlines received.
        headlines: usize,
        /// Filings received.
        filings: usize,
    },
    /// One feed item was appended.
    FeedAppended(FeedKind),
    /// Session state was merged.
    SessionMerged,
    /// Frame was unusable and dropped.
    Dropped,
    /// Frame needs no routing.
    Ignored,
}

struct FeedBuffers {
    news: RollingBuffer<FeedItem>,
    filings: RollingBuffer<FeedItem>,
}

/// Routes inbound frames.
pub struct Dispatcher {
    puller: Arc<DeltaPuller>,
    resync: Arc<ResyncCoordinator>,
    mirror: Arc<dyn Mirror>,
    events: EventHub,
    feeds: Mutex<FeedBuffers>,
    session: RwLock<Map<String, Value>>,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        puller: Arc<DeltaPuller>,
        resync: Arc<ResyncCoordinator>,
        mirror: Arc<dyn Mirror>,
        events: EventHub,
        feed_capacity: usize,
    ) -> Self {
        Self {
            puller,
            resync,
            mirror,
            events,
            feeds: Mutex::new(FeedBuffers {
                news: RollingBuffer::new(feed_capacity),
                filings: RollingBuffer::new(feed_capacity),
            }),
            session: RwLock::new(Map::new()),
        }
    }

    /// Route one frame. Must be called from within a tokio runtime.
    pub fn on_frame(&self, frame: InboundFrame) -> FrameRoute {
        match frame {
            InboundFrame::SymbolDoorbell { kind, cursor } => {
                let Some(target) = cursor else {
                    tracing::warn!(?kind, "Doorbell without a cursor dropped");
                    return FrameRoute::Dropped;
                };
                tracing::debug!(?kind, target, "Symbol doorbell");
                let puller = Arc::clone(&self.puller);
                tokio::spawn(async move {
                    if let Err(e) = puller.pull_to_at_least(target).await {
                        tracing::warn!(error = %e, target, "Delta pull failed");
                    }
                });
                FrameRoute::CatchUp { target }
            }
            InboundFrame::SymbolInvalidate { items, version } => {
                tracing::info!(?version, items = items.len(), "Symbols invalidated");
                if items.is_empty() {
                    self.resync.request_hydration();
                    FrameRoute::Resync
                } else {
                    self.mirror.remove(&items);
                    FrameRoute::Removed { count: items.len() }
                }
            }
            InboundFrame::HydrationResponse(payload) => self.replace_feeds(payload),
            InboundFrame::NewsDelta(item) => self.append_feed(FeedKind::News, item),
            InboundFrame::FilingDelta(item) => self.append_feed(FeedKind::Filing, item),
            InboundFrame::SessionUpdate(patch) => {
                merge_fields(&mut self.session.write(), &patch);
                self.events.publish(SyncEvent::SessionUpdated);
                FrameRoute::SessionMerged
            }
            InboundFrame::Ping | InboundFrame::RegisterAck(_) => FrameRoute::Ignored,
            InboundFrame::Unknown { kind } => {
                tracing::debug!(kind, "Ignoring unhandled frame type");
                FrameRoute::Ignored
            }
        }
    }

    /// Recent headlines, newest first.
    #[must_use]
    pub fn recent_news(&self) -> Vec<FeedItem> {
        self.feeds.lock().news.iter().cloned().collect()
    }

    /// Recent filings, newest first.
    #[must_use]
    pub fn recent_filings(&self) -> Vec<FeedItem> {
        self.feeds.lock().filings.iter().cloned().collect()
    }

    /// Current merged session state.
    #[must_use]
    pub fn session(&self) -> Map<String, Value> {
        self.session.read().clone()
    }

    fn replace_feeds(&self, payload: HydrationPayload) -> FrameRoute {
        if let Some(metadata) = &payload.metadata {
            tracing::info!(%metadata, "Feed hydration metadata");
        }

        let headlines: Vec<FeedItem> = payload.headlines.into_iter().map(FeedItem::new).collect();
        let filings: Vec<FeedItem> = payload.filings.into_iter().map(FeedItem::new).collect();

        self.mirror.clear_news();
        self.mirror.clear_filings();
        for item in &headlines {
            for symbol in item.symbols() {
                self.mirror.attach_news(item, &symbol);
            }
        }
        for item in &filings {
            for symbol in item.symbols() {
                self.mirror.attach_filing(item, &symbol);
            }
        }

        let (headline_count, filing_count) = (headlines.len(), filings.len());
        {
            let mut feeds = self.feeds.lock();
            feeds.news.replace(headlines);
            feeds.filings.replace(filings);
        }
        self.mirror.mark_hydration_complete();

        tracing::info!(
            headlines = headline_count,
            filings = filing_count,
            "Feeds hydrated"
        );
        self.events.publish(SyncEvent::FeedHydrated {
            headlines: headline_count,
            filings: filing_count,
        });
        FrameRoute::FeedReplaced {
            headlines: headline_count,
            filings: filing_count,
        }
    }

    fn append_feed(&self, kind: FeedKind, item: FeedItem) -> FrameRoute {
        for symbol in item.symbols() {
            match kind {
                FeedKind::News => self.mirror.attach_news(&item, &symbol),
                FeedKind::Filing => self.mirror.attach_filing(&item, &symbol),
            }
        }

        let mut feeds = self.feeds.lock();
        match kind {
            FeedKind::News => feeds.news.push_front(item),
            FeedKind::Filing => feeds.filings.push_front(item),
        }
        drop(feeds);

        tracing::debug!(kind = kind.as_str(), "Feed item appended");
        FrameRoute::FeedAppended(kind)
    }
}
