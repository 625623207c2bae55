//! Circuit breakers for the LLM, vector retrieval, and database subsystems
//! (spec §4.6), modeled on the `pybreaker`-backed breaker in the original
//! implementation's `resilience.py`: closed → open after `fail_max`
//! consecutive failures, half-open after `reset_timeout`, permitting one
//! probe call.

use parking_lot::Mutex;
use querymesh_core::{AuditLogger, Severity};
use std::sync::Arc;
use std::fmt;
use std::time::{Duration, Instant};

/// The breaker's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    fn name(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// An error surfaced by [`CircuitBreaker::guard`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker is open; the call was short-circuited without touching
    /// the underlying subsystem (spec §4.6, §8 property 7).
    Open(String),
    /// The wrapped call itself failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open(name) => write!(f, "circuit breaker '{name}' is open"),
            BreakerError::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for BreakerError<E> {}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while a half-open probe is in flight, so concurrent callers don't
    /// all rush through simultaneously.
    probe_in_flight: bool,
}

/// One named circuit breaker instance (spec §4.6 "Three global breakers —
/// LLM, vector retrieval, database").
pub struct CircuitBreaker {
    name: String,
    fail_max: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
    audit: Option<Arc<AuditLogger>>,
}

impl CircuitBreaker {
    /// Builds a breaker named `name` that opens after `fail_max` consecutive
    /// non-soft failures and attempts recovery after `reset_timeout`.
    pub fn new(name: impl Into<String>, fail_max: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            fail_max,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
            audit: None,
        }
    }

    /// Attaches an audit logger; breaker state transitions are then emitted
    /// as `breaker_state_change` events (spec §4.6).
    pub fn with_audit_logger(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The LLM breaker's resolved defaults from the original implementation:
    /// `fail_max=5`, `reset_timeout=60s`.
    pub fn llm_defaults() -> Self {
        Self::new("LLM_BREAKER", 5, Duration::from_secs(60))
    }

    /// The vector-retrieval breaker's resolved defaults: `fail_max=5`,
    /// `reset_timeout=30s` ("faster recovery for infra blips").
    pub fn vector_defaults() -> Self {
        Self::new("VECTOR_BREAKER", 5, Duration::from_secs(30))
    }

    /// The database breaker's resolved defaults: `fail_max=5`,
    /// `reset_timeout=30s`.
    pub fn db_defaults() -> Self {
        Self::new("DB_BREAKER", 5, Duration::from_secs(30))
    }

    /// The breaker's current state, resolving `Open` to `HalfOpen` if
    /// `reset_timeout` has elapsed (without mutating state — a read-only
    /// peek for observability/tests).
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock();
        self.effective_state(&inner)
    }

    fn effective_state(&self, inner: &Inner) -> BreakerState {
        match inner.state {
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset_timeout {
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open
                }
            }
            other => other,
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        if inner.state == to {
            return;
        }
        let from = inner.state;
        inner.state = to;
        if to == BreakerState::Open {
            inner.opened_at = Some(Instant::now());
        }
        if let Some(audit) = &self.audit {
            audit.emit(
                "breaker_state_change",
                "",
                "",
                serde_json::json!({
                    "breaker": self.name,
                    "from": from.name(),
                    "to": to.name(),
                }),
            );
        }
    }

    /// Runs `fut`, short-circuiting to [`BreakerError::Open`] if the breaker
    /// is open. `is_soft_error` classifies a returned error as "soft"
    /// (rate-limit/auth/bad-request-shaped) — soft errors never count
    /// toward `fail_max` (spec §4.6).
    pub async fn guard<F, T, E>(
        &self,
        is_soft_error: impl Fn(&E) -> bool,
        fut: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock();
            match self.effective_state(&inner) {
                BreakerState::Open => return Err(BreakerError::Open(self.name.clone())),
                BreakerState::HalfOpen => {
                    if inner.probe_in_flight {
                        return Err(BreakerError::Open(self.name.clone()));
                    }
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.probe_in_flight = true;
                }
                BreakerState::Closed => {}
            }
        }

        let result = fut.await;

        let mut inner = self.inner.lock();
        inner.probe_in_flight = false;
        match &result {
            Ok(_) => {
                inner.consecutive_failures = 0;
                self.transition(&mut inner, BreakerState::Closed);
            }
            Err(e) => {
                if !is_soft_error(e) {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.fail_max {
                        self.transition(&mut inner, BreakerState::Open);
                    }
                } else if inner.state == BreakerState::HalfOpen {
                    // A soft failure during a probe doesn't prove recovery,
                    // but it also isn't the fault the breaker guards
                    // against; re-open rather than leave it stuck half-open.
                    self.transition(&mut inner, BreakerState::Open);
                }
            }
        }

        result.map_err(BreakerError::Inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_fail_max_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", 2, Duration::from_secs(60));
        for _ in 0..2 {
            let _: Result<(), BreakerError<&str>> =
                breaker.guard(|_| false, async { Err("boom") }).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let result: Result<(), BreakerError<&str>> = breaker.guard(|_| false, async { Ok(()) }).await;
        assert!(matches!(result, Err(BreakerError::Open(_))));
    }

    #[tokio::test]
    async fn soft_errors_do_not_count_toward_fail_max() {
        let breaker = CircuitBreaker::new("test", 2, Duration::from_secs(60));
        for _ in 0..5 {
            let _: Result<(), BreakerError<&str>> =
                breaker.guard(|_| true, async { Err("rate_limited") }).await;
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_after_reset_timeout_permits_one_probe() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        let _: Result<(), BreakerError<&str>> = breaker.guard(|_| false, async { Err("boom") }).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let result: Result<(), BreakerError<&str>> = breaker.guard(|_| false, async { Ok(()) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
