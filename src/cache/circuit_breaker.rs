/// Circuit breaker guarding the rank cache store
///
/// After repeated store failures the circuit opens and cache calls fail fast,
/// sending requests straight to fresh computation. After the recovery timeout a
/// few trial calls are let through (half-open) before the circuit closes again.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing fast
    Open,
    /// Testing if the store has recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside the window that open the circuit
    pub failure_threshold: u32,
    /// Time to wait before transitioning from Open to HalfOpen
    pub recovery_timeout: Duration,
    /// Successes needed to close the circuit from HalfOpen
    pub success_threshold: u32,
    /// Time window for counting failures
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            failure_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    last_state_change: Instant,
    failure_timestamps: Vec<Instant>,
    total_failures: u64,
    half_open_successes: u32,
}

/// Circuit breaker for cache store operations
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

/// Circuit breaker statistics for monitoring
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub total_failures: u64,
    pub recent_failures: u32,
    pub half_open_successes: u32,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                last_state_change: Instant::now(),
                failure_timestamps: Vec::new(),
                total_failures: 0,
                half_open_successes: 0,
            }),
        }
    }

    /// Get current circuit state
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Whether calls should be skipped. Moves Open to HalfOpen once the recovery timeout passed.
    pub async fn is_open(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => false,
            CircuitState::Open => {
                if inner.last_state_change.elapsed() >= self.config.recovery_timeout {
                    Self::transition(&mut inner, CircuitState::HalfOpen);
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Record a successful store call
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => {
                inner.failure_timestamps.clear();
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                info!(
                    "Circuit breaker: cache success in HalfOpen state ({}/{})",
                    inner.half_open_successes, self.config.success_threshold
                );
                if inner.half_open_successes >= self.config.success_threshold {
                    Self::transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                debug!("Circuit breaker: success recorded while Open");
            }
        }
    }

    /// Record a failed store call
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.total_failures += 1;
        inner.failure_timestamps.push(now);

        let window = self.config.failure_window;
        inner
            .failure_timestamps
            .retain(|t| now.duration_since(*t) < window);

        match inner.state {
            CircuitState::Closed => {
                let recent = inner.failure_timestamps.len() as u32;
                warn!("Circuit breaker: cache failure recorded ({} recent failures)", recent);
                if recent >= self.config.failure_threshold {
                    Self::transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker: cache failure in HalfOpen state, reopening circuit");
                Self::transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {
                debug!("Circuit breaker: additional failure while Open (total: {})", inner.total_failures);
            }
        }
    }

    /// Get failure statistics
    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock().await;
        let window = self.config.failure_window;
        let recent = inner
            .failure_timestamps
            .iter()
            .filter(|t| t.elapsed() < window)
            .count() as u32;

        CircuitBreakerStats {
            state: inner.state,
            total_failures: inner.total_failures,
            recent_failures: recent,
            half_open_successes: inner.half_open_successes,
        }
    }

    fn transition(inner: &mut BreakerState, to: CircuitState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        inner.last_state_change = Instant::now();
        inner.half_open_successes = 0;
        if to == CircuitState::Closed {
            inner.failure_timestamps.clear();
        }
        match to {
            CircuitState::Open => warn!("Circuit breaker: transitioned from {:?} to Open", from),
            _ => info!("Circuit breaker: transitioned from {:?} to {:?}", from, to),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::new();
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(!cb.is_open().await);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(cb.is_open().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(cb.stats().await.total_failures, 2);
    }

    #[tokio::test]
    async fn test_half_open_then_closed() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(50),
            success_threshold: 2,
            ..Default::default()
        });

        cb.record_failure().await;
        cb.record_failure().await;
        assert!(cb.is_open().await);

        sleep(Duration::from_millis(100)).await;
        assert!(!cb.is_open().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(50),
            ..Default::default()
        });

        cb.record_failure().await;
        cb.record_failure().await;
        sleep(Duration::from_millis(100)).await;
        assert!(!cb.is_open().await);

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_failures_outside_window_are_forgotten() {
        let cb = CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: 3,
            failure_window: Duration::from_millis(100),
            ..Default::default()
        });

        cb.record_failure().await;
        cb.record_failure().await;
        sleep(Duration::from_millis(150)).await;

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
