//! Circuit breaker for application service calls
//!
//! After `failure_threshold` consecutive transport failures the breaker opens
//! and every call fails fast with [`AllotError::LookupFailed`] until the
//! cooldown expires. The first call after the cooldown is a trial: success
//! closes the breaker, failure opens it for another cooldown.
//!
//! There is no fallback value. A caller that cannot reach the service gets an
//! error and retries later.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::error::{AllotError, AllotResult};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Calls pass through
    Closed { failures: u32 },
    /// Too many failures, calls fail fast
    Open { until: Instant },
    /// One trial call is in flight
    HalfOpen { since: Instant },
}

/// Consecutive-failure circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Consecutive failures that open the breaker
    failure_threshold: u32,
    /// How long the breaker stays open
    cooldown: Duration,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    /// Create a closed breaker
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(CircuitState::Closed { failures: 0 }),
        }
    }

    /// Run `call` through the breaker
    ///
    /// Only [`AllotError::LookupFailed`] and [`AllotError::HttpError`] count as
    /// failures. Any other outcome means the service answered.
    pub async fn call<T, F, Fut>(&self, call: F) -> AllotResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AllotResult<T>>,
    {
        self.acquire()?;

        let result = call().await;
        match &result {
            Err(AllotError::LookupFailed(_)) | Err(AllotError::HttpError(_)) => {
                self.record_failure()
            }
            _ => self.record_success(),
        }
        result
    }

    /// Whether calls are currently rejected
    pub fn is_open(&self) -> bool {
        match *self.state.lock() {
            CircuitState::Open { until } => Instant::now() < until,
            _ => false,
        }
    }

    fn acquire(&self) -> AllotResult<()> {
        let mut state = self.state.lock();
        let now = Instant::now();

        match *state {
            CircuitState::Closed { .. } => Ok(()),
            CircuitState::Open { until } if now >= until => {
                info!("Application service breaker cooldown expired, allowing trial call");
                *state = CircuitState::HalfOpen { since: now };
                Ok(())
            }
            // A trial that never reported back does not wedge the breaker
            CircuitState::HalfOpen { since } if now.duration_since(since) >= self.cooldown => {
                warn!("Application service trial call timed out, allowing another");
                *state = CircuitState::HalfOpen { since: now };
                Ok(())
            }
            CircuitState::Open { until } => Err(AllotError::LookupFailed(format!(
                "Application service circuit open for another {}ms",
                until.saturating_duration_since(now).as_millis()
            ))),
            CircuitState::HalfOpen { .. } => Err(AllotError::LookupFailed(
                "Application service circuit half-open, trial in flight".to_string(),
            )),
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        if !matches!(*state, CircuitState::Closed { .. }) {
            info!("Application service recovered, closing breaker");
        }
        *state = CircuitState::Closed { failures: 0 };
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        let failures = match *state {
            CircuitState::Closed { failures } => failures + 1,
            CircuitState::HalfOpen { .. } | CircuitState::Open { .. } => self.failure_threshold,
        };

        if failures >= self.failure_threshold {
            error!(
                failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Application service breaker tripped"
            );
            *state = CircuitState::Open {
                until: Instant::now() + self.cooldown,
            };
        } else {
            *state = CircuitState::Closed { failures };
        }
    }
}
