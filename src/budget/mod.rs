//! Page, byte, and wall-clock budget tracking.
//!
//! `record` is lock-free; `exceeded` is sticky — once any configured cap
//! has been reached the tracker reports exceeded for the rest of the run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::CrawlConfig;

#[derive(Debug)]
pub struct BudgetTracker {
    max_pages: Option<u64>,
    max_bytes: Option<u64>,
    max_wall_clock: Option<Duration>,
    pages: AtomicU64,
    bytes: AtomicU64,
    started_at: Instant,
    tripped: AtomicBool,
}

impl BudgetTracker {
    #[must_use]
    pub fn new(
        max_pages: Option<u64>,
        max_bytes: Option<u64>,
        max_wall_clock: Option<Duration>,
    ) -> Self {
        Self {
            max_pages,
            max_bytes,
            max_wall_clock,
            pages: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            started_at: Instant::now(),
            tripped: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.max_pages(), config.max_bytes(), config.max_wall_clock())
    }

    /// Account one completed fetch. Atomic with respect to concurrent
    /// workers; the caps are checked immediately so `exceeded` flips as
    /// soon as the recording that crossed the line completes.
    pub fn record(&self, pages: u64, bytes: u64) {
        let total_pages = self.pages.fetch_add(pages, Ordering::AcqRel) + pages;
        let total_bytes = self.bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;

        if self.max_pages.is_some_and(|cap| total_pages >= cap)
            || self.max_bytes.is_some_and(|cap| total_bytes >= cap)
        {
            self.tripped.store(true, Ordering::Release);
        }
    }

    /// Whether any configured cap has been reached. Sticky: never
    /// transitions back to `false`.
    #[must_use]
    pub fn exceeded(&self) -> bool {
        if self.tripped.load(Ordering::Acquire) {
            return true;
        }
        if self
            .max_wall_clock
            .is_some_and(|cap| self.started_at.elapsed() >= cap)
        {
            self.tripped.store(true, Ordering::Release);
            return true;
        }
        false
    }

    #[must_use]
    pub fn pages_so_far(&self) -> u64 {
        self.pages.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn bytes_so_far(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}
