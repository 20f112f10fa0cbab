//! Unit tests for the sliding-window rate limiter through its public API

use std::time::Duration;
use stash_fetcher::{RateLimit, RateLimiter};
use tokio::time::Instant;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[test]
fn test_saturated_window_waits_for_oldest_call() {
    let mut limiter = RateLimiter::new(&[RateLimit::from_millis(3, 1000)]);
    let t0 = Instant::now();
    limiter.record_call_at(t0);
    limiter.record_call_at(t0 + ms(100));
    limiter.record_call_at(t0 + ms(200));

    assert_eq!(limiter.time_until_ready_at(t0 + ms(250)), Some(ms(750)));
    assert_eq!(limiter.time_until_ready_at(t0 + ms(1000)), None);
}

#[test]
fn test_unsaturated_window_is_ready() {
    let mut limiter = RateLimiter::new(&[RateLimit::from_secs(45, 60)]);
    let t0 = Instant::now();
    for i in 0..44 {
        limiter.record_call_at(t0 + ms(i));
    }
    assert_eq!(limiter.time_until_ready_at(t0 + ms(50)), None);
}

#[test]
fn test_shrunk_rules_keep_history() {
    let mut limiter = RateLimiter::new(&[RateLimit::from_secs(45, 60)]);
    let t0 = Instant::now();
    for i in 0..5 {
        limiter.record_call_at(t0 + ms(i * 10));
    }

    limiter.update_rate_limits(&[RateLimit::from_secs(2, 60)]);

    assert_eq!(limiter.rules(), vec![RateLimit::from_secs(2, 60)]);
    assert_eq!(limiter.windows()[0].len(), 5);
    // the oldest of five calls retires first; the limiter stays blocked after it
    assert_eq!(limiter.time_until_ready_at(t0 + ms(100)), Some(ms(59_900)));
    assert_eq!(
        limiter.time_until_ready_at(t0 + ms(60_000)),
        Some(ms(10))
    );
}

#[test]
fn test_added_rule_starts_empty() {
    let mut limiter = RateLimiter::new(&[RateLimit::from_secs(10, 1)]);
    let t0 = Instant::now();
    limiter.record_call_at(t0);

    limiter.update_rate_limits(&[RateLimit::from_secs(10, 1), RateLimit::from_secs(1, 60)]);

    assert_eq!(limiter.windows()[0].len(), 1);
    assert!(limiter.windows()[1].is_empty());
    assert_eq!(limiter.time_until_ready_at(t0), None);
}
