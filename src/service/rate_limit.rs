//! Sliding-window rate limiting with server-adjustable quotas
//!
//! A [`RateLimiter`] tracks one [`RateWindow`] per quota rule. Every call that
//! reaches the network is stamped into all windows, and the worker asks
//! [`RateLimiter::time_until_ready`] before dispatching the next call.
//!
//! The limiter is owned by exactly one worker and is never shared, so it needs
//! no locking. Other tasks change its quotas by pushing a [`Rejection`] onto
//! the worker's queue.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// One quota rule: at most `hits` calls within any trailing `period`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimit {
    /// Maximum number of calls in the window
    pub hits: u32,
    /// Length of the sliding window
    pub period: Duration,
}

impl RateLimit {
    /// Create a rule from a hit count and a window length
    pub const fn new(hits: u32, period: Duration) -> Self {
        Self { hits, period }
    }

    /// Create a rule from a hit count and a window length in milliseconds
    pub const fn from_millis(hits: u32, period_ms: u64) -> Self {
        Self::new(hits, Duration::from_millis(period_ms))
    }

    /// Create a rule from a hit count and a window length in seconds
    pub const fn from_secs(hits: u32, period_secs: u64) -> Self {
        Self::new(hits, Duration::from_secs(period_secs))
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}ms", self.hits, self.period.as_millis())
    }
}

/// Quota replacement and cooldown received from the server after HTTP 429
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Rules to govern the channel from now on
    pub rate_limits: Vec<RateLimit>,
    /// Mandatory pause before the next call on the channel
    pub retry_after: Duration,
}

impl Rejection {
    /// Create a rejection notice
    pub fn new(rate_limits: Vec<RateLimit>, retry_after: Duration) -> Self {
        Self {
            rate_limits,
            retry_after,
        }
    }
}

/// Timestamps of recent calls judged against a single [`RateLimit`]
#[derive(Debug, Clone)]
pub struct RateWindow {
    rule: RateLimit,
    stamps: VecDeque<Instant>,
}

impl RateWindow {
    fn new(rule: RateLimit) -> Self {
        Self {
            rule,
            stamps: VecDeque::new(),
        }
    }

    /// The rule this window enforces
    pub fn rule(&self) -> RateLimit {
        self.rule
    }

    /// Number of calls still remembered by this window
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Whether the window holds no calls
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    fn is_saturated(&self) -> bool {
        self.stamps.len() >= self.rule.hits as usize
    }

    /// Drop calls that have left the trailing period.
    fn prune_expired(&mut self, now: Instant) {
        while let Some(&oldest) = self.stamps.front() {
            if oldest + self.rule.period > now {
                break;
            }
            self.stamps.pop_front();
        }
    }

    /// Instant at which this window stops blocking a new call.
    ///
    /// An empty window with `hits == 0` never frees up, so the best answer is
    /// one full period from now.
    fn next_available(&self, now: Instant) -> Instant {
        match self.stamps.front() {
            Some(&oldest) => oldest + self.rule.period,
            None => now + self.rule.period,
        }
    }
}

/// Rate limiter enforcing several concurrent quota rules
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    windows: Vec<RateWindow>,
}

impl RateLimiter {
    /// Create a limiter with one empty window per rule
    pub fn new(rules: &[RateLimit]) -> Self {
        Self {
            windows: rules.iter().copied().map(RateWindow::new).collect(),
        }
    }

    /// Rules currently enforced, in window order
    pub fn rules(&self) -> Vec<RateLimit> {
        self.windows.iter().map(RateWindow::rule).collect()
    }

    /// Tracked windows, in rule order
    pub fn windows(&self) -> &[RateWindow] {
        &self.windows
    }

    /// Replace the governing rules.
    ///
    /// Windows are matched to rules by position. Surviving windows keep their
    /// history so calls made under the old quota still count against the new
    /// one; surplus windows are dropped and missing ones start empty.
    pub fn update_rate_limits(&mut self, rules: &[RateLimit]) {
        self.windows.truncate(rules.len());
        for (window, rule) in self.windows.iter_mut().zip(rules) {
            window.rule = *rule;
        }
        let tracked = self.windows.len();
        self.windows
            .extend(rules[tracked..].iter().copied().map(RateWindow::new));
    }

    /// Stamp a call that reached the network into every window
    pub fn record_call(&mut self) {
        self.record_call_at(Instant::now());
    }

    /// Stamp a call made at `now` into every window
    pub fn record_call_at(&mut self, now: Instant) {
        for window in &mut self.windows {
            window.stamps.push_back(now);
        }
    }

    /// How long to wait before the next call, or `None` if it may go now
    pub fn time_until_ready(&mut self) -> Option<Duration> {
        self.time_until_ready_at(Instant::now())
    }

    /// [`RateLimiter::time_until_ready`] judged at `now`.
    ///
    /// Every saturated window must let its oldest call age out before the
    /// next call, so the wait is the latest of those instants. A window that
    /// remembers more calls than its rule allows (rules shrank after a
    /// rejection) stays saturated after that wait; callers re-check until this
    /// returns `None`.
    pub fn time_until_ready_at(&mut self, now: Instant) -> Option<Duration> {
        for window in &mut self.windows {
            window.prune_expired(now);
        }

        let next_available = self
            .windows
            .iter()
            .filter(|window| window.is_saturated())
            .map(|window| window.next_available(now))
            .max()?;

        Some(next_available.saturating_duration_since(now))
    }
}
