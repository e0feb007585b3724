//! The frontier: priority-ordered set of URLs awaiting fetch.
//!
//! A URL lives in exactly one of three places: the frontier (queued), the
//! in-flight set held implicitly by workers, or the visited set. `push`
//! deduplicates against both the queued and visited sets, so the same
//! canonical URL can never be scheduled twice.

pub mod strategy;

pub use strategy::PriorityStrategy;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use crate::urlnorm::CanonicalUrl;

/// A URL scheduled for fetching.
///
/// Two entries with an equal URL are duplicates regardless of depth or
/// provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: CanonicalUrl,
    pub depth: usize,
    pub discovered_from: Option<CanonicalUrl>,
    /// Sitemap-declared or strategy-assigned priority
    pub priority_score: f64,
    pub inserted_at: DateTime<Utc>,
    /// Monotonic insertion sequence, assigned by the frontier
    #[serde(default)]
    pub(crate) seq: u64,
}

impl FrontierEntry {
    #[must_use]
    pub fn new(url: CanonicalUrl, depth: usize, discovered_from: Option<CanonicalUrl>) -> Self {
        Self {
            url,
            depth,
            discovered_from,
            priority_score: 0.0,
            inserted_at: Utc::now(),
            seq: 0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, score: f64) -> Self {
        self.priority_score = score;
        self
    }
}

/// Result of a push attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Already queued or already visited
    Duplicate,
    /// Bounded frontier at capacity; entry dropped
    QueueFull,
    Closed,
}

/// Result of a pop attempt
#[derive(Debug)]
pub enum PopOutcome {
    Entry(FrontierEntry),
    /// Queue empty for the full idle timeout
    Idle,
    Closed,
}

/// Concurrent set of canonical URLs that have completed processing.
///
/// The visited set owns the URL-level dedup decision; insertion reports
/// whether the URL was already present so exactly one caller wins.
#[derive(Debug, Default)]
pub struct VisitedSet {
    inner: DashSet<String>,
}

impl VisitedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert and report whether the URL was already present.
    pub fn insert(&self, url: &CanonicalUrl) -> bool {
        !self.inner.insert(url.as_str().to_string())
    }

    #[must_use]
    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.inner.contains(url.as_str())
    }

    pub fn remove(&self, url: &CanonicalUrl) {
        self.inner.remove(url.as_str());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

struct HeapItem {
    entry: FrontierEntry,
    strategy: Arc<dyn PriorityStrategy>,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; strategy::compare returns Less for
        // the entry that should pop first, so reverse it here.
        self.strategy.compare(&self.entry, &other.entry).reverse()
    }
}

struct FrontierState {
    heap: BinaryHeap<HeapItem>,
    queued: HashSet<String>,
    /// Entries handed to workers and not yet marked done. Tracked under
    /// the same lock as the heap so quiescence checks cannot race a pop.
    in_flight: usize,
    closed: bool,
}

/// Priority queue of pending URLs with URL-level deduplication.
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    strategy: Arc<dyn PriorityStrategy>,
    visited: Arc<VisitedSet>,
    max_queue_size: Option<usize>,
    idle_timeout: Duration,
    next_seq: AtomicU64,
}

impl Frontier {
    #[must_use]
    pub fn new(
        strategy: Box<dyn PriorityStrategy>,
        visited: Arc<VisitedSet>,
        max_queue_size: Option<usize>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                heap: BinaryHeap::new(),
                queued: HashSet::new(),
                in_flight: 0,
                closed: false,
            }),
            notify: Notify::new(),
            strategy: Arc::from(strategy),
            visited,
            max_queue_size,
            idle_timeout,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Schedule a URL. No-op when the URL is already queued or visited.
    pub async fn push(&self, mut entry: FrontierEntry) -> PushOutcome {
        if self.visited.contains(&entry.url) {
            return PushOutcome::Duplicate;
        }

        let mut state = self.state.lock().await;
        if state.closed {
            return PushOutcome::Closed;
        }
        if !state.queued.insert(entry.url.as_str().to_string()) {
            return PushOutcome::Duplicate;
        }
        if self
            .max_queue_size
            .is_some_and(|cap| state.heap.len() >= cap)
        {
            state.queued.remove(entry.url.as_str());
            return PushOutcome::QueueFull;
        }

        entry.seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        state.heap.push(HeapItem {
            entry,
            strategy: Arc::clone(&self.strategy),
        });
        drop(state);

        self.notify.notify_one();
        PushOutcome::Queued
    }

    /// Take the highest-priority entry, waiting up to the idle timeout
    /// when the queue is empty. `Idle` lets the worker pool decide
    /// whether the crawl has quiesced.
    pub async fn pop(&self) -> PopOutcome {
        let deadline = tokio::time::Instant::now() + self.idle_timeout;

        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(item) = state.heap.pop() {
                    state.queued.remove(item.entry.url.as_str());
                    state.in_flight += 1;
                    return PopOutcome::Entry(item.entry);
                }
                if state.closed {
                    return PopOutcome::Closed;
                }
            }

            tokio::select! {
                () = self.notify.notified() => {}
                () = tokio::time::sleep_until(deadline) => return PopOutcome::Idle,
            }
        }
    }

    #[must_use]
    pub async fn size(&self) -> usize {
        self.state.lock().await.heap.len()
    }

    /// Mark a popped entry as fully processed (success, failure, or
    /// skip). Pairs with every `PopOutcome::Entry`.
    pub async fn mark_done(&self) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        // Wake idle poppers so they can re-evaluate quiescence
        self.notify.notify_waiters();
    }

    /// True when nothing is queued and no popped entry is still being
    /// processed: no new work can ever appear.
    #[must_use]
    pub async fn is_quiescent(&self) -> bool {
        let state = self.state.lock().await;
        state.heap.is_empty() && state.in_flight == 0
    }

    /// Close the frontier: pending entries are discarded and subsequent
    /// pops return `Closed` immediately.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.heap.clear();
        state.queued.clear();
        drop(state);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::strategy::BreadthFirst;
    use super::*;
    use crate::urlnorm::Normalizer;

    fn url(s: &str) -> CanonicalUrl {
        Normalizer::default().normalize(s, None).unwrap()
    }

    fn frontier(max: Option<usize>) -> Frontier {
        Frontier::new(
            Box::new(BreadthFirst),
            Arc::new(VisitedSet::new()),
            max,
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn push_pop_roundtrip() {
        let f = frontier(None);
        let outcome = f
            .push(FrontierEntry::new(url("http://s.test/a"), 0, None))
            .await;
        assert_eq!(outcome, PushOutcome::Queued);
        assert_eq!(f.size().await, 1);

        match f.pop().await {
            PopOutcome::Entry(e) => assert_eq!(e.url.as_str(), "http://s.test/a"),
            other => panic!("expected entry, got {other:?}"),
        }
        assert_eq!(f.size().await, 0);
    }

    #[tokio::test]
    async fn duplicate_queued_url_rejected() {
        let f = frontier(None);
        f.push(FrontierEntry::new(url("http://s.test/a"), 0, None))
            .await;
        let outcome = f
            .push(FrontierEntry::new(url("http://s.test/a"), 3, None))
            .await;
        assert_eq!(outcome, PushOutcome::Duplicate);
        assert_eq!(f.size().await, 1);
    }

    #[tokio::test]
    async fn visited_url_rejected() {
        let visited = Arc::new(VisitedSet::new());
        let f = Frontier::new(
            Box::new(BreadthFirst),
            Arc::clone(&visited),
            None,
            Duration::from_millis(50),
        );
        visited.insert(&url("http://s.test/done"));
        let outcome = f
            .push(FrontierEntry::new(url("http://s.test/done"), 0, None))
            .await;
        assert_eq!(outcome, PushOutcome::Duplicate);
    }

    #[tokio::test]
    async fn bounded_queue_rejects_when_full() {
        let f = frontier(Some(1));
        f.push(FrontierEntry::new(url("http://s.test/a"), 0, None))
            .await;
        let outcome = f
            .push(FrontierEntry::new(url("http://s.test/b"), 0, None))
            .await;
        assert_eq!(outcome, PushOutcome::QueueFull);
        // The rejected URL may be pushed again once there is room
        match f.pop().await {
            PopOutcome::Entry(_) => {}
            other => panic!("expected entry, got {other:?}"),
        }
        let outcome = f
            .push(FrontierEntry::new(url("http://s.test/b"), 0, None))
            .await;
        assert_eq!(outcome, PushOutcome::Queued);
    }

    #[tokio::test]
    async fn empty_pop_times_out_idle() {
        let f = frontier(None);
        match f.pop().await {
            PopOutcome::Idle => {}
            other => panic!("expected idle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pop_wakes_on_concurrent_push() {
        let f = Arc::new(Frontier::new(
            Box::new(BreadthFirst),
            Arc::new(VisitedSet::new()),
            None,
            Duration::from_secs(5),
        ));

        let popper = {
            let f = Arc::clone(&f);
            tokio::spawn(async move { f.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.push(FrontierEntry::new(url("http://s.test/late"), 0, None))
            .await;

        match popper.await.unwrap() {
            PopOutcome::Entry(e) => assert_eq!(e.url.as_str(), "http://s.test/late"),
            other => panic!("expected entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_drains_and_unblocks() {
        let f = frontier(None);
        f.push(FrontierEntry::new(url("http://s.test/a"), 0, None))
            .await;
        f.close().await;
        assert!(matches!(f.pop().await, PopOutcome::Closed));
        assert_eq!(
            f.push(FrontierEntry::new(url("http://s.test/b"), 0, None))
                .await,
            PushOutcome::Closed
        );
    }

    #[tokio::test]
    async fn priority_order_respected() {
        let f = frontier(None);
        f.push(FrontierEntry::new(url("http://s.test/deep"), 2, None))
            .await;
        f.push(FrontierEntry::new(url("http://s.test/shallow"), 0, None))
            .await;

        match f.pop().await {
            PopOutcome::Entry(e) => assert_eq!(e.url.as_str(), "http://s.test/shallow"),
            other => panic!("expected entry, got {other:?}"),
        }
    }
}
