//! Circuit breaker for route protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure rate >= threshold with at least min_samples in window
//! Open → Half-Open: first admission check after the cool-down
//! Half-Open → Closed: every trial request succeeded
//! Half-Open → Open: any trial request fails
//! ```
//!
//! # Design Decisions
//! - Per-route circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - The mutex is held for bookkeeping only, never across the upstream call
//! - Every transition bumps a generation; results admitted under an older
//!   generation are discarded

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::window::SlidingWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerMode {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerMode {
    /// Gauge encoding: 0 closed, 1 open, 2 half-open.
    pub fn as_gauge(self) -> f64 {
        match self {
            BreakerMode::Closed => 0.0,
            BreakerMode::Open => 1.0,
            BreakerMode::HalfOpen => 2.0,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    mode: BreakerMode,
    window: SlidingWindow,
    transitioned_at: Instant,
    trials_admitted: u32,
    trial_successes: u32,
    generation: u64,
}

/// Admission refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerRejected {
    pub mode: BreakerMode,
    /// Remaining cool-down when open.
    pub retry_in: Option<Duration>,
}

/// Point-in-time view for the management endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub route_id: String,
    pub state: BreakerMode,
    pub enabled: bool,
    pub calls_in_window: u32,
    pub failures_in_window: u32,
    pub failure_rate: f64,
    pub half_open_trials: u32,
    pub since_transition_ms: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    route_id: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(route_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::new_at(route_id, config, Instant::now())
    }

    pub fn new_at(route_id: impl Into<String>, config: CircuitBreakerConfig, now: Instant) -> Self {
        let window = SlidingWindow::new(Duration::from_secs(config.window_secs), now);
        let route_id = route_id.into();
        metrics::record_breaker_state(&route_id, BreakerMode::Closed);
        Self {
            route_id,
            config,
            state: Mutex::new(BreakerState {
                mode: BreakerMode::Closed,
                window,
                transitioned_at: now,
                trials_admitted: 0,
                trial_successes: 0,
                generation: 0,
            }),
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> BreakerMode {
        self.lock().mode
    }

    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, BreakerRejected> {
        self.try_acquire_at(Instant::now())
    }

    /// Ask to send one request through the breaker.
    pub fn try_acquire_at(self: &Arc<Self>, now: Instant) -> Result<BreakerPermit, BreakerRejected> {
        if !self.config.enabled {
            return Ok(self.permit(0, false));
        }

        let mut state = self.lock();
        if state.mode == BreakerMode::Open {
            let cooldown = Duration::from_secs(self.config.open_cooldown_secs);
            let elapsed = now.saturating_duration_since(state.transitioned_at);
            if elapsed < cooldown {
                return Err(BreakerRejected {
                    mode: BreakerMode::Open,
                    retry_in: Some(cooldown - elapsed),
                });
            }
            self.transition(&mut state, BreakerMode::HalfOpen, now);
        }

        match state.mode {
            BreakerMode::Closed => Ok(self.permit(state.generation, false)),
            BreakerMode::HalfOpen if state.trials_admitted < self.config.half_open_trial_count => {
                state.trials_admitted += 1;
                Ok(self.permit(state.generation, true))
            }
            mode => Err(BreakerRejected { mode, retry_in: None }),
        }
    }

    fn permit(self: &Arc<Self>, generation: u64, trial: bool) -> BreakerPermit {
        BreakerPermit {
            breaker: self.clone(),
            generation,
            trial,
            settled: false,
        }
    }

    fn record(&self, generation: u64, failure: bool, now: Instant) {
        if !self.config.enabled {
            return;
        }

        let mut state = self.lock();
        if state.generation != generation {
            tracing::trace!(route = %self.route_id, "Discarding result from previous breaker generation");
            return;
        }

        match state.mode {
            BreakerMode::Closed => {
                state.window.record(now, failure);
                let totals = state.window.totals(now);
                if totals.total >= self.config.min_samples
                    && totals.failure_rate() >= self.config.failure_threshold
                {
                    tracing::warn!(
                        route = %self.route_id,
                        calls = totals.total,
                        failures = totals.failures,
                        "Failure rate over threshold"
                    );
                    self.transition(&mut state, BreakerMode::Open, now);
                }
            }
            BreakerMode::HalfOpen => {
                if failure {
                    self.transition(&mut state, BreakerMode::Open, now);
                } else {
                    state.trial_successes += 1;
                    if state.trial_successes >= self.config.half_open_trial_count {
                        self.transition(&mut state, BreakerMode::Closed, now);
                    }
                }
            }
            BreakerMode::Open => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation && state.mode == BreakerMode::HalfOpen {
            state.trials_admitted = state.trials_admitted.saturating_sub(1);
        }
    }

    fn transition(&self, state: &mut BreakerState, to: BreakerMode, now: Instant) {
        let from = state.mode;
        state.mode = to;
        state.transitioned_at = now;
        state.trials_admitted = 0;
        state.trial_successes = 0;
        state.generation += 1;
        state.window.reset(now);

        match to {
            BreakerMode::Open => {
                tracing::warn!(route = %self.route_id, ?from, "Circuit breaker opened")
            }
            _ => tracing::info!(route = %self.route_id, ?from, ?to, "Circuit breaker transition"),
        }
        metrics::record_breaker_state(&self.route_id, to);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> BreakerSnapshot {
        let state = self.lock();
        let totals = state.window.totals(now);
        BreakerSnapshot {
            route_id: self.route_id.clone(),
            state: state.mode,
            enabled: self.config.enabled,
            calls_in_window: totals.total,
            failures_in_window: totals.failures,
            failure_rate: totals.failure_rate(),
            half_open_trials: state.trials_admitted,
            since_transition_ms: now.saturating_duration_since(state.transitioned_at).as_millis() as u64,
        }
    }
}

/// Admission ticket for one request.
///
/// Dropping an unrecorded trial permit hands the trial slot back.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl BreakerPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(self, failure: bool) {
        self.record_at(failure, Instant::now());
    }

    pub fn record_at(mut self, failure: bool, now: Instant) {
        self.settled = true;
        self.breaker.record(self.generation, failure, now);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 0.5,
            min_samples: 10,
            window_secs: 30,
            open_cooldown_secs: 30,
            half_open_trial_count: 5,
        }
    }

    fn breaker(start: Instant) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new_at("auth", config(), start))
    }

    fn feed(breaker: &Arc<CircuitBreaker>, now: Instant, failures: u32, successes: u32) {
        for _ in 0..failures {
            breaker.try_acquire_at(now).unwrap().record_at(true, now);
        }
        for _ in 0..successes {
            breaker.try_acquire_at(now).unwrap().record_at(false, now);
        }
    }

    #[test]
    fn opens_at_threshold_with_enough_samples() {
        let start = Instant::now();
        let cb = breaker(start);

        feed(&cb, start, 6, 3);
        assert_eq!(cb.mode(), BreakerMode::Closed, "9 samples is below min_samples");

        feed(&cb, start, 0, 1);
        assert_eq!(cb.mode(), BreakerMode::Open);

        let rejected = cb.try_acquire_at(start + Duration::from_secs(1)).unwrap_err();
        assert_eq!(rejected.mode, BreakerMode::Open);
        assert_eq!(rejected.retry_in, Some(Duration::from_secs(29)));
    }

    #[test]
    fn below_threshold_never_opens_within_window() {
        let start = Instant::now();
        let cb = breaker(start);
        for i in 0..100u32 {
            let now = start + Duration::from_millis(i as u64 * 250);
            let failure = i % 5 >= 3; // 40%
            cb.try_acquire_at(now).unwrap().record_at(failure, now);
            assert_eq!(cb.mode(), BreakerMode::Closed);
        }
    }

    #[test]
    fn half_open_closes_after_all_trials_succeed() {
        let start = Instant::now();
        let cb = breaker(start);
        feed(&cb, start, 10, 0);
        assert_eq!(cb.mode(), BreakerMode::Open);

        let later = start + Duration::from_secs(30);
        let trials: Vec<_> = (0..5).map(|_| cb.try_acquire_at(later).unwrap()).collect();
        assert_eq!(cb.mode(), BreakerMode::HalfOpen);
        assert!(trials.iter().all(|p| p.is_trial()));

        let extra = cb.try_acquire_at(later).unwrap_err();
        assert_eq!(extra.mode, BreakerMode::HalfOpen);

        for permit in trials {
            permit.record_at(false, later);
        }
        assert_eq!(cb.mode(), BreakerMode::Closed);
        assert_eq!(cb.snapshot_at(later).calls_in_window, 0);
    }

    #[test]
    fn trial_failure_reopens_and_restarts_cooldown() {
        let start = Instant::now();
        let cb = breaker(start);
        feed(&cb, start, 10, 0);

        let later = start + Duration::from_secs(31);
        let first = cb.try_acquire_at(later).unwrap();
        let second = cb.try_acquire_at(later).unwrap();
        first.record_at(true, later);
        assert_eq!(cb.mode(), BreakerMode::Open);

        // Late result from the previous generation is ignored.
        second.record_at(false, later);
        assert_eq!(cb.mode(), BreakerMode::Open);

        let rejected = cb.try_acquire_at(later + Duration::from_secs(10)).unwrap_err();
        assert_eq!(rejected.retry_in, Some(Duration::from_secs(20)));
    }

    #[test]
    fn stale_generation_results_do_not_count() {
        let start = Instant::now();
        let cb = breaker(start);
        let old = cb.try_acquire_at(start).unwrap();
        feed(&cb, start, 10, 0);

        let later = start + Duration::from_secs(30);
        let trials: Vec<_> = (0..5).map(|_| cb.try_acquire_at(later).unwrap()).collect();
        for permit in trials {
            permit.record_at(false, later);
        }
        assert_eq!(cb.mode(), BreakerMode::Closed);

        old.record_at(true, later);
        assert_eq!(cb.snapshot_at(later).failures_in_window, 0);
    }

    #[test]
    fn dropped_trial_returns_its_slot() {
        let start = Instant::now();
        let cb = breaker(start);
        feed(&cb, start, 10, 0);

        let later = start + Duration::from_secs(30);
        let trials: Vec<_> = (0..5).map(|_| cb.try_acquire_at(later).unwrap()).collect();
        assert!(cb.try_acquire_at(later).is_err());

        drop(trials);
        assert!(cb.try_acquire_at(later).is_ok());
    }

    #[test]
    fn disabled_breaker_always_admits() {
        let start = Instant::now();
        let cb = Arc::new(CircuitBreaker::new_at(
            "auth",
            CircuitBreakerConfig {
                enabled: false,
                ..config()
            },
            start,
        ));
        feed(&cb, start, 50, 0);
        assert_eq!(cb.mode(), BreakerMode::Closed);
        assert!(cb.try_acquire_at(start).is_ok());
    }

    #[test]
    fn concurrent_storm_trips_once() {
        let start = Instant::now();
        let cb = breaker(start);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = cb.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if let Ok(permit) = cb.try_acquire_at(start) {
                            permit.record_at(true, start);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cb.mode(), BreakerMode::Open);
        assert!(cb.try_acquire_at(start + Duration::from_secs(29)).is_err());
    }
}
