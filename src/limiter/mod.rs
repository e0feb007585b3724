//! Per-host request pacing.
//!
//! Each host carries its own state behind a fair async mutex, so waiters
//! are served in arrival order and the engine never hammers one host from
//! several workers at once. The effective gap between requests is
//! `max(base_delay, robots crawl-delay, adaptive_delay)`; the adaptive
//! component grows under 429/5xx pressure and decays on sustained success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use log::debug;
use tokio::sync::Mutex;

/// Ceiling for a server-supplied Retry-After
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);
/// Ceiling for the multiplicative 5xx backoff
const MAX_ADAPTIVE_DELAY: Duration = Duration::from_secs(60);
/// Consecutive successes required before the adaptive delay halves
const DECAY_AFTER_SUCCESSES: u32 = 5;

/// Pacing state for a single host
#[derive(Debug, Clone)]
pub struct HostState {
    pub next_allowed_at: Instant,
    pub crawl_delay: Option<Duration>,
    pub adaptive_delay: Duration,
    pub consecutive_failures: u32,
    pub consecutive_429s: u32,
    consecutive_successes: u32,
}

impl HostState {
    fn new() -> Self {
        Self {
            next_allowed_at: Instant::now(),
            crawl_delay: None,
            adaptive_delay: Duration::ZERO,
            consecutive_failures: 0,
            consecutive_429s: 0,
            consecutive_successes: 0,
        }
    }
}

/// Enforces a minimum inter-request gap per host.
pub struct RateLimiter {
    hosts: DashMap<String, Arc<Mutex<HostState>>>,
    base_delay: Duration,
    respect_crawl_delay: bool,
    adaptive: bool,
}

impl RateLimiter {
    #[must_use]
    pub fn new(base_delay: Duration, respect_crawl_delay: bool, adaptive: bool) -> Self {
        Self {
            hosts: DashMap::new(),
            base_delay,
            respect_crawl_delay,
            adaptive,
        }
    }

    fn host_state(&self, host: &str) -> Arc<Mutex<HostState>> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HostState::new())))
            .clone()
    }

    fn effective_delay(&self, state: &HostState) -> Duration {
        let mut delay = self.base_delay;
        if self.respect_crawl_delay
            && let Some(crawl_delay) = state.crawl_delay
        {
            delay = delay.max(crawl_delay);
        }
        delay.max(state.adaptive_delay)
    }

    /// Suspend until this host's next slot, then claim it.
    ///
    /// Waiters on the same host are served FIFO (the tokio mutex queues
    /// fairly, and the slot holder sleeps while holding the lock).
    /// `next_allowed_at` only ever moves forward.
    pub async fn wait(&self, host: &str) {
        let state = self.host_state(host);
        let mut guard = state.lock().await;

        let now = Instant::now();
        if guard.next_allowed_at > now {
            tokio::time::sleep(guard.next_allowed_at - now).await;
        }

        let delay = self.effective_delay(&guard);
        guard.next_allowed_at = Instant::now() + delay;
    }

    /// Record the crawl-delay declared by this host's robots.txt.
    pub async fn set_crawl_delay(&self, host: &str, delay: Option<Duration>) {
        let state = self.host_state(host);
        state.lock().await.crawl_delay = delay;
    }

    /// Feed a fetch outcome back into the adaptive policy.
    ///
    /// * 429 — adopt the server's Retry-After (capped at 120 s), or grow
    ///   multiplicatively when none was given.
    /// * 5xx — multiply the adaptive delay by 1.5 up to the ceiling.
    /// * success — after five in a row, halve the delay back toward zero
    ///   (the base delay still applies as the floor).
    pub async fn report_outcome(&self, host: &str, status: u16, retry_after: Option<Duration>) {
        let state = self.host_state(host);
        let mut guard = state.lock().await;

        match status {
            429 => {
                guard.consecutive_429s += 1;
                guard.consecutive_failures += 1;
                guard.consecutive_successes = 0;
                if self.adaptive {
                    guard.adaptive_delay = match retry_after {
                        Some(ra) => ra.min(MAX_RETRY_AFTER),
                        None => grow(guard.adaptive_delay, self.base_delay),
                    };
                    debug!(
                        "rate limiter: {host} returned 429, adaptive delay now {:?}",
                        guard.adaptive_delay
                    );
                }
            }
            500..=599 => {
                guard.consecutive_failures += 1;
                guard.consecutive_successes = 0;
                if self.adaptive {
                    guard.adaptive_delay = grow(guard.adaptive_delay, self.base_delay);
                    debug!(
                        "rate limiter: {host} returned {status}, adaptive delay now {:?}",
                        guard.adaptive_delay
                    );
                }
            }
            _ => {
                guard.consecutive_failures = 0;
                guard.consecutive_429s = 0;
                guard.consecutive_successes += 1;
                if self.adaptive
                    && guard.consecutive_successes >= DECAY_AFTER_SUCCESSES
                    && !guard.adaptive_delay.is_zero()
                {
                    guard.adaptive_delay = guard.adaptive_delay / 2;
                    if guard.adaptive_delay <= self.base_delay {
                        guard.adaptive_delay = Duration::ZERO;
                    }
                    guard.consecutive_successes = 0;
                }
            }
        }
    }

    /// Snapshot of a host's state, for diagnostics and tests.
    pub async fn host_snapshot(&self, host: &str) -> Option<HostState> {
        let state = self.hosts.get(host)?.clone();
        let guard = state.lock().await;
        Some(guard.clone())
    }
}

fn grow(current: Duration, base: Duration) -> Duration {
    let seed = current.max(base).max(Duration::from_millis(100));
    seed.mul_f64(1.5).min(MAX_ADAPTIVE_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(base_ms: u64) -> RateLimiter {
        RateLimiter::new(Duration::from_millis(base_ms), true, true)
    }

    #[tokio::test]
    async fn enforces_minimum_gap() {
        let limiter = limiter(50);
        let start = Instant::now();
        limiter.wait("example.com").await;
        limiter.wait("example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn hosts_do_not_block_each_other() {
        let limiter = limiter(200);
        limiter.wait("a.test").await;
        let start = Instant::now();
        limiter.wait("b.test").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn retry_after_adopted_and_capped() {
        let limiter = limiter(10);
        limiter
            .report_outcome("h.test", 429, Some(Duration::from_secs(200)))
            .await;
        let state = limiter.host_snapshot("h.test").await.unwrap();
        assert_eq!(state.adaptive_delay, MAX_RETRY_AFTER);
        assert_eq!(state.consecutive_429s, 1);
    }

    #[tokio::test]
    async fn server_errors_grow_delay() {
        let limiter = limiter(10);
        limiter.report_outcome("h.test", 500, None).await;
        let first = limiter.host_snapshot("h.test").await.unwrap().adaptive_delay;
        limiter.report_outcome("h.test", 503, None).await;
        let second = limiter.host_snapshot("h.test").await.unwrap().adaptive_delay;
        assert!(second > first);
        assert!(second <= MAX_ADAPTIVE_DELAY);
    }

    #[tokio::test]
    async fn sustained_success_decays_delay() {
        let limiter = limiter(10);
        limiter
            .report_outcome("h.test", 429, Some(Duration::from_secs(8)))
            .await;
        for _ in 0..DECAY_AFTER_SUCCESSES {
            limiter.report_outcome("h.test", 200, None).await;
        }
        let state = limiter.host_snapshot("h.test").await.unwrap();
        assert_eq!(state.adaptive_delay, Duration::from_secs(4));
        assert_eq!(state.consecutive_429s, 0);

        // Another streak halves it again, and it bottoms out at zero
        // once it dips under the base delay.
        for _ in 0..(DECAY_AFTER_SUCCESSES * 10) {
            limiter.report_outcome("h.test", 200, None).await;
        }
        let state = limiter.host_snapshot("h.test").await.unwrap();
        assert_eq!(state.adaptive_delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn crawl_delay_respected_in_effective_gap() {
        let limiter = limiter(10);
        limiter
            .set_crawl_delay("h.test", Some(Duration::from_millis(80)))
            .await;
        let start = Instant::now();
        limiter.wait("h.test").await;
        limiter.wait("h.test").await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
