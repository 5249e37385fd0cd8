//! Circuit breaker for the drain loop.
//!
//! Tracks consecutive remote failures and gates whether the sync
//! manager may attempt network operations at all. Decoupled from the
//! per-item retry timers: one slow item backs off on its own, while the
//! breaker stops the whole loop after a run of failures so a remote
//! outage is not met with a retry storm.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of the breaker, for status surfaces and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_at: Option<i64>,
    pub next_retry_at: Option<i64>,
}

/// Failure-gating state machine.
///
/// Valid transitions only:
/// closed → open (failure count reaches the threshold),
/// open → half-open (reset window elapsed, caller-driven),
/// half-open → closed (next success),
/// half-open → open (next failure, fresh window).
///
/// All methods take `now` as epoch milliseconds; the breaker never
/// reads a clock itself.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<i64>,
    next_retry_at: Option<i64>,
    threshold: u32,
    reset_window: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_window: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure_at: None,
            next_retry_at: None,
            threshold,
            reset_window,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether an attempt is allowed right now. Pure read: when the
    /// breaker is open and the window has elapsed this returns true,
    /// and the caller is expected to call `half_open()` before
    /// attempting.
    pub fn can_attempt(&self, now: i64) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => self.next_retry_at.is_none_or(|at| now >= at),
        }
    }

    /// Open → half-open. No-op in any other state.
    pub fn half_open(&mut self) {
        if self.state == BreakerState::Open {
            self.state = BreakerState::HalfOpen;
        }
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.next_retry_at = None;
    }

    /// Record one failed attempt. Returns true if this failure opened
    /// the breaker (the drain loop halts its pass on that signal).
    pub fn record_failure(&mut self, now: i64) -> bool {
        self.failure_count += 1;
        self.last_failure_at = Some(now);
        match self.state {
            BreakerState::HalfOpen => {
                self.trip(now);
                true
            }
            BreakerState::Closed if self.failure_count >= self.threshold => {
                self.trip(now);
                true
            }
            _ => false,
        }
    }

    /// Force the breaker back to closed, clearing all failure state.
    /// Used by "force sync now" so a user-triggered retry is never
    /// blocked by a stale open breaker.
    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.last_failure_at = None;
        self.next_retry_at = None;
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            last_failure_at: self.last_failure_at,
            next_retry_at: self.next_retry_at,
        }
    }

    fn trip(&mut self, now: i64) {
        self.state = BreakerState::Open;
        self.next_retry_at = Some(now + self.reset_window.as_millis() as i64);
    }
}
