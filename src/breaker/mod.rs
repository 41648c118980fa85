// Circuit breaker guarding calls to an unreliable decision source
//
// closed -> open when `failure_threshold` failures land within `window`.
// open -> half_open lazily, on the first state read after `cooldown`.
// half_open lets exactly one trial through; its outcome closes or re-opens.

mod config;

pub use config::BreakerConfig;

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub recent_failures: usize,
    pub failure_threshold: usize,
    pub trips: u64,
    pub successes: u64,
    pub cooldown_ms: u64,
}

struct Inner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    trips: u64,
    successes: u64,
}

impl Inner {
    /// Apply the lazy open -> half_open transition
    fn refresh(&mut self, cooldown: Duration) {
        if self.state == BreakerState::Open
            && self
                .opened_at
                .is_some_and(|opened| opened.elapsed() >= cooldown)
        {
            self.state = BreakerState::HalfOpen;
            self.trial_in_flight = false;
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
        self.trips += 1;
    }
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
                trips: 0,
                successes: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.refresh(self.config.cooldown());
        inner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Whether a call may go through now.
    ///
    /// In half_open this returns true once and then false until the trial's
    /// outcome is recorded.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.successes += 1;
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.failures.clear();
            inner.opened_at = None;
            inner.trial_in_flight = false;
            info!(breaker = %self.name, "Circuit breaker closed after successful trial");
        }
    }

    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.trip(now);
                warn!(breaker = %self.name, trips = inner.trips, "Trial call failed, circuit re-opened");
            }
            BreakerState::Closed => {
                inner.failures.push_back(now);
                inner.prune(now, self.config.window());
                if inner.failures.len() >= self.config.failure_threshold {
                    inner.trip(now);
                    warn!(
                        breaker = %self.name,
                        failures = inner.failures.len(),
                        trips = inner.trips,
                        "Circuit breaker opened"
                    );
                }
            }
            // Late outcome of a call admitted before the trip
            BreakerState::Open => {}
        }
    }

    pub fn stats(&self) -> BreakerStats {
        let mut inner = self.lock();
        inner.prune(Instant::now(), self.config.window());
        BreakerStats {
            state: inner.state,
            recent_failures: inner.failures.len(),
            failure_threshold: self.config.failure_threshold,
            trips: inner.trips,
            successes: inner.successes,
            cooldown_ms: self.config.cooldown_ms,
        }
    }

    /// Back to closed with cleared counters
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.trial_in_flight = false;
        inner.trips = 0;
        inner.successes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn breaker(threshold: usize, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                window_ms: 30_000,
                cooldown_ms,
            },
        )
    }

    #[test]
    fn test_starts_closed() {
        let breaker = breaker(3, 50);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow_request());
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = breaker(3, 10_000);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.stats().trips, 1);
    }

    #[test]
    fn test_blocks_while_open() {
        let breaker = breaker(1, 10_000);
        breaker.record_failure();

        for _ in 0..5 {
            assert!(!breaker.allow_request());
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_half_open_after_cooldown_allows_one_trial() {
        let breaker = breaker(1, 30);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
        assert!(!breaker.allow_request());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_trial_success_closes() {
        let breaker = breaker(2, 30);
        breaker.record_failure();
        breaker.record_failure();

        thread::sleep(Duration::from_millis(50));
        assert!(breaker.allow_request());
        breaker.record_success();

        let stats = breaker.stats();
        assert_eq!(stats.state, BreakerState::Closed);
        assert_eq!(stats.recent_failures, 0);
        assert_eq!(stats.successes, 1);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_trial_failure_reopens() {
        let breaker = breaker(1, 30);
        breaker.record_failure();

        thread::sleep(Duration::from_millis(50));
        assert!(breaker.allow_request());
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());
        assert_eq!(breaker.stats().trips, 2);

        // Cooldown restarts from the re-open
        thread::sleep(Duration::from_millis(50));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_failures_outside_window_do_not_count() {
        let breaker = CircuitBreaker::new(
            "windowed",
            BreakerConfig {
                failure_threshold: 2,
                window_ms: 30,
                cooldown_ms: 10_000,
            },
        );
        breaker.record_failure();
        thread::sleep(Duration::from_millis(50));
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.stats().recent_failures, 1);
    }

    #[test]
    fn test_success_while_closed_keeps_window() {
        let breaker = breaker(3, 10_000);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_reset() {
        let breaker = breaker(1, 10_000);
        breaker.record_failure();
        breaker.reset();

        let stats = breaker.stats();
        assert_eq!(stats.state, BreakerState::Closed);
        assert_eq!(stats.trips, 0);
        assert_eq!(stats.recent_failures, 0);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_concurrent_half_open_admits_single_trial() {
        let breaker = Arc::new(breaker(1, 20));
        breaker.record_failure();
        thread::sleep(Duration::from_millis(40));

        let mut handles = vec![];
        for _ in 0..8 {
            let breaker = Arc::clone(&breaker);
            handles.push(thread::spawn(move || breaker.allow_request()));
        }

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let breaker = breaker(5, 30_000);
        let json = serde_json::to_value(breaker.stats()).unwrap();
        assert_eq!(json["state"], "closed");
        assert_eq!(json["failure_threshold"], 5);
        assert_eq!(json["cooldown_ms"], 30_000);
    }
}
