//! Broadcast bus for crawl events.
//!
//! Delivery is best-effort: events published with no live subscribers are
//! counted as dropped, and a slow subscriber that lags past the channel
//! capacity loses the oldest events (tokio broadcast semantics).

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::types::{CrawlEvent, ShutdownReason};

const DEFAULT_CAPACITY: usize = 1024;

/// Counters describing bus activity so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusMetrics {
    pub events_published: u64,
    pub events_dropped: u64,
    pub active_subscribers: usize,
}

/// Publish/subscribe hub for [`CrawlEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<CrawlEvent>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish an event; returns the number of subscribers that received
    /// it (zero when nobody is listening).
    pub fn publish(&self, event: CrawlEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                receivers
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }

    /// Publish the terminal shutdown event.
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.publish(CrawlEvent::shutdown(reason));
    }

    #[must_use]
    pub fn metrics(&self) -> BusMetrics {
        BusMetrics {
            events_published: self.published.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            active_subscribers: self.sender.receiver_count(),
        }
    }
}
