//! Retry and circuit-breaker policies for external calls.
//!
//! Both policies are standalone objects composed around the PSP charge by
//! the payment orchestrator, so each is testable in isolation against a
//! scripted callable and a (paused) clock.
//!
//! Breaker lifecycle: CLOSED records outcomes in a sliding window and
//! opens when the window fills past the failure-rate threshold; OPEN sheds
//! calls until the cool-down elapses; HALF-OPEN admits a bounded probe
//! budget and closes only if every probe succeeds.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    backoff_factor: u32,
}

impl RetryPolicy {
    /// Create a retry policy.
    pub fn new(max_attempts: u32, initial_backoff: Duration, backoff_factor: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            backoff_factor,
        }
    }

    /// Backoff before the attempt following `completed_attempts`.
    fn backoff_after(&self, completed_attempts: u32) -> Duration {
        self.initial_backoff * self.backoff_factor.pow(completed_attempts.saturating_sub(1))
    }

    /// Run `op` up to `max_attempts` times. Only errors for which
    /// `is_retryable` returns true are retried; others propagate at once.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let backoff = self.backoff_after(attempt);
                    debug!(
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Human-readable name for health reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Error wrapper distinguishing shed calls from inner failures.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,

    #[error(transparent)]
    Inner(E),
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Sliding window length, in calls.
    pub window_size: usize,
    /// Failure rate at or above which the circuit opens.
    pub failure_rate_threshold: f64,
    /// How long the circuit stays open before probing.
    pub open_duration: Duration,
    /// Probe calls admitted while half-open.
    pub half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(10),
            half_open_probes: 3,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probes_started: u32,
    probe_failures: u32,
    probes_completed: u32,
}

/// Sliding-window failure-rate circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probes_started: 0,
                probe_failures: 0,
                probes_completed: 0,
            }),
        }
    }

    /// Current state, accounting for an elapsed cool-down.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh_state(&mut inner);
        inner.state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("circuit breaker lock poisoned")
    }

    fn refresh_state(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open {
            let cooled = inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.open_duration);
            if cooled {
                debug!("Circuit breaker cool-down elapsed, transitioning to half-open");
                inner.state = CircuitState::HalfOpen;
                inner.probes_started = 0;
                inner.probe_failures = 0;
                inner.probes_completed = 0;
            }
        }
    }

    /// Admission check; reserves a probe slot when half-open.
    fn admit(&self) -> Result<(), ()> {
        let mut inner = self.lock();
        self.refresh_state(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(()),
            CircuitState::HalfOpen => {
                if inner.probes_started < self.config.half_open_probes {
                    inner.probes_started += 1;
                    Ok(())
                } else {
                    Err(())
                }
            }
        }
    }

    fn trip_open(&self, inner: &mut BreakerInner) {
        warn!("Circuit breaker opened");
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.window.clear();
    }

    fn record(&self, success: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(success);
                if inner.window.len() > self.config.window_size {
                    inner.window.pop_front();
                }
                if inner.window.len() >= self.config.window_size {
                    let failures = inner.window.iter().filter(|ok| !**ok).count();
                    let rate = failures as f64 / inner.window.len() as f64;
                    if rate >= self.config.failure_rate_threshold {
                        self.trip_open(&mut inner);
                    }
                }
            }
            CircuitState::HalfOpen => {
                inner.probes_completed += 1;
                if !success {
                    inner.probe_failures += 1;
                }
                if inner.probe_failures > 0 {
                    self.trip_open(&mut inner);
                } else if inner.probes_completed >= self.config.half_open_probes {
                    info!("Circuit breaker closed after successful probes");
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                }
            }
            // A call admitted before the trip completes afterwards; its
            // outcome no longer changes the decision.
            CircuitState::Open => {}
        }
    }

    /// Run `op` through the breaker.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.admit().is_err() {
            return Err(BreakerError::Open);
        }

        match op().await {
            Ok(value) => {
                self.record(true);
                Ok(value)
            }
            Err(e) => {
                self.record(false);
                Err(BreakerError::Inner(e))
            }
        }
    }
}
