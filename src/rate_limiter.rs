use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

/// Per-key sliding-window limiter.
///
/// Each key owns a log of admitted timestamps (seconds since `origin`). The log is
/// pruned on access only; there is no background sweep. The read-prune-append
/// sequence runs under the map's entry lock, so concurrent calls for one key
/// cannot both take the last slot.
///
/// Keys whose whole log has expired are dropped by a sweep that piggybacks on
/// admissions: at most once per window, and only while the table holds more than
/// `sweep_threshold` keys.
pub struct RateLimiter {
    limit: usize,
    window: f64,
    origin: Instant,
    events: DashMap<String, VecDeque<f64>>, // admitted timestamps within window, per key
    sweep_threshold: usize,
    last_sweep: AtomicU64, // f64 bits
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::with_sweep_threshold(limit, window, DEFAULT_SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(limit: usize, window: Duration, sweep_threshold: usize) -> Self {
        Self {
            limit,
            window: window.as_secs_f64(),
            origin: Instant::now(),
            events: DashMap::new(),
            sweep_threshold,
            last_sweep: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window)
    }

    /// Admits or rejects a request for `key` using the monotonic clock.
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = self.origin.elapsed().as_secs_f64();
        self.admit(key, now)
    }

    /// Admits or rejects a request for `key` at time `now` (seconds).
    /// Rejected attempts are never recorded.
    pub fn admit(&self, key: &str, now: f64) -> bool {
        let admitted = self.admit_key(key, now);
        // The entry guard is released here; retain would deadlock on its shard otherwise.
        if admitted && self.events.len() > self.sweep_threshold && self.claim_sweep(now) {
            self.sweep(now);
        }
        admitted
    }

    fn admit_key(&self, key: &str, now: f64) -> bool {
        match self.events.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let log = occupied.get_mut();
                log.retain(|&timestamp| now - timestamp < self.window);

                if log.len() >= self.limit {
                    if log.is_empty() {
                        occupied.remove();
                    }
                    return false;
                }

                log.push_back(now);
                true
            }
            Entry::Vacant(vacant) => {
                if self.limit == 0 {
                    return false;
                }
                vacant.insert(VecDeque::from([now]));
                true
            }
        }
    }

    /// True for the one caller that gets to sweep in the current window.
    fn claim_sweep(&self, now: f64) -> bool {
        let last_bits = self.last_sweep.load(Ordering::Relaxed);
        if now - f64::from_bits(last_bits) < self.window {
            return false;
        }
        self.last_sweep
            .compare_exchange(last_bits, now.to_bits(), Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Drops every key with no event inside the window at `now`.
    fn sweep(&self, now: f64) {
        let before = self.events.len();
        self.events
            .retain(|_, log| log.iter().any(|&timestamp| now - timestamp < self.window));
        debug!("Rate limiter sweep: {} -> {} keys", before, self.events.len());
    }

    /// Number of keys currently holding a log.
    pub fn tracked_keys(&self) -> usize {
        self.events.len()
    }
}
