//! Failure gate in front of the backend API.
//!
//! The orchestrator fans four stages out against the same backend, so one
//! outage would otherwise multiply into a burst of doomed retries. After
//! `failure_threshold` consecutive failures the gate opens and calls are
//! rejected locally; once `open_timeout` elapses a single probe is let
//! through and its outcome decides between closing and re-opening.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Trip threshold and cool-down for the backend gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// Internal state machine. `Closed` tracks the current failure streak;
/// `Open` remembers when it tripped so the cool-down can expire.
#[derive(Debug, Clone, Copy)]
enum Gate {
    Closed { failure_streak: u32 },
    Open { tripped_at: Instant },
    HalfOpen,
}

/// Thread-safe circuit breaker shared across concurrent backend calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    gate: Mutex<Gate>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            gate: Mutex::new(Gate::Closed { failure_streak: 0 }),
        }
    }

    /// Whether the next backend call may go out. An open circuit whose
    /// cool-down has expired flips to half-open and admits that call as
    /// the probe.
    pub fn allow_request(&self) -> bool {
        let mut gate = self.lock();
        match *gate {
            Gate::Closed { .. } | Gate::HalfOpen => true,
            Gate::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.config.open_timeout {
                    *gate = Gate::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        *self.lock() = Gate::Closed { failure_streak: 0 };
    }

    /// A failed probe re-opens immediately; in the closed state the streak
    /// has to reach the threshold first.
    pub fn record_failure(&self) {
        let mut gate = self.lock();
        *gate = match *gate {
            Gate::Closed { failure_streak } => {
                let streak = failure_streak.saturating_add(1);
                if streak >= self.config.failure_threshold {
                    Gate::Open {
                        tripped_at: Instant::now(),
                    }
                } else {
                    Gate::Closed {
                        failure_streak: streak,
                    }
                }
            }
            Gate::HalfOpen | Gate::Open { .. } => Gate::Open {
                tripped_at: Instant::now(),
            },
        };
    }

    pub fn state(&self) -> CircuitState {
        match *self.lock() {
            Gate::Closed { .. } => CircuitState::Closed,
            Gate::Open { .. } => CircuitState::Open,
            Gate::HalfOpen => CircuitState::HalfOpen,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate
            .lock()
            .expect("circuit breaker lock is not poisoned")
    }
}
