//! Circuit breaker around fallible async calls.
//!
//! # States
//! - Closed: calls pass through, failures are counted
//! - Open: calls fail fast, the wrapped future is never polled
//! - Half-Open: one probe call at a time decides the next transition
//!
//! # State Transitions
//! ```text
//! Closed → Open:      failure_count >= failure_threshold
//! Closed → Open:      any unexpected failure
//! Open → Half-Open:   next call after recovery_timeout since the last failure
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open:   any failure
//! ```
//!
//! The breaker knows nothing about the wrapped operation. Time is read from
//! `tokio::time::Instant` so tests can drive recovery with a paused clock.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Thresholds for one circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Expected failures in Closed state before opening.
    pub failure_threshold: u32,
    /// Time since the last failure before a probe is admitted.
    pub recovery_timeout: Duration,
    /// Consecutive Half-Open successes needed to close again.
    pub success_threshold: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// How a failed call counts against the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A known failure mode; counts toward `failure_threshold`.
    Expected,
    /// Anything else; opens the circuit immediately.
    Unexpected,
}

/// Error returned by a guarded call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitError<E> {
    /// Rejected without calling the wrapped operation.
    #[error("Circuit '{name}' is open")]
    Open { name: String, retry_after: Duration },

    /// The wrapped operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> CircuitError<E> {
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Returns the inner error, if the call was attempted.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open { .. } => None,
        }
    }
}

/// Point-in-time statistics for one circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    /// Successful calls as a percentage of total calls.
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secs_since_last_failure: Option<f64>,
}

#[derive(Debug)]
struct Record {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
}

impl Record {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            probe_in_flight: false,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
        }
    }
}

/// A named circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    record: Mutex<Record>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            record: Mutex::new(Record::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Current state as last recorded. Open → Half-Open is evaluated lazily
    /// on the next call, so an Open circuit past its recovery timeout still
    /// reports Open here.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `f` through the breaker, counting every failure as expected.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(f, |_| FailureKind::Expected).await
    }

    /// Run `f` through the breaker, letting `classify` decide whether a
    /// failure is expected or should open the circuit immediately.
    pub async fn call_classified<F, Fut, T, E, C>(
        &self,
        f: F,
        classify: C,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> FailureKind,
    {
        let mut admission = self.admit()?;
        match f().await {
            Ok(value) => {
                admission.settle(|breaker, record| breaker.on_success(record));
                Ok(value)
            }
            Err(e) => {
                let kind = classify(&e);
                admission.settle(|breaker, record| breaker.on_failure(record, kind));
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Force the circuit back to Closed and clear all counters.
    pub fn reset(&self) {
        let mut record = self.lock();
        *record = Record::new();
        debug!(circuit = %self.name, "Circuit reset");
    }

    pub fn stats(&self) -> CircuitStats {
        let record = self.lock();
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if record.total_calls == 0 {
            0.0
        } else {
            record.successful_calls as f64 / record.total_calls as f64 * 100.0
        };
        CircuitStats {
            name: self.name.clone(),
            state: record.state,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs(),
            success_threshold: self.config.success_threshold,
            failure_count: record.failure_count,
            success_count: record.success_count,
            total_calls: record.total_calls,
            successful_calls: record.successful_calls,
            failed_calls: record.failed_calls,
            rejected_calls: record.rejected_calls,
            success_rate,
            secs_since_last_failure: record.last_failure.map(|t| t.elapsed().as_secs_f64()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit<E>(&self) -> Result<Admission<'_>, CircuitError<E>> {
        let mut record = self.lock();
        record.total_calls += 1;

        if record.state == CircuitState::Open {
            let elapsed = record.last_failure.map_or(Duration::MAX, |t| t.elapsed());
            if elapsed >= self.config.recovery_timeout {
                debug!(circuit = %self.name, "Circuit half-open, admitting probe");
                record.state = CircuitState::HalfOpen;
                record.success_count = 0;
            } else {
                record.rejected_calls += 1;
                return Err(CircuitError::Open {
                    name: self.name.clone(),
                    retry_after: self.config.recovery_timeout.saturating_sub(elapsed),
                });
            }
        }

        let probe = record.state == CircuitState::HalfOpen;
        if probe {
            if record.probe_in_flight {
                record.rejected_calls += 1;
                return Err(CircuitError::Open {
                    name: self.name.clone(),
                    retry_after: Duration::ZERO,
                });
            }
            record.probe_in_flight = true;
        }

        Ok(Admission {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn on_success(&self, record: &mut Record) {
        record.successful_calls += 1;
        match record.state {
            CircuitState::HalfOpen => {
                record.success_count += 1;
                if record.success_count >= self.config.success_threshold {
                    debug!(circuit = %self.name, "Circuit closed");
                    record.state = CircuitState::Closed;
                    record.failure_count = 0;
                    record.success_count = 0;
                }
            }
            CircuitState::Closed | CircuitState::Open => record.failure_count = 0,
        }
    }

    fn on_failure(&self, record: &mut Record, kind: FailureKind) {
        record.failed_calls += 1;
        record.failure_count += 1;
        record.last_failure = Some(Instant::now());

        let open = match (record.state, kind) {
            (_, FailureKind::Unexpected) | (CircuitState::HalfOpen | CircuitState::Open, _) => {
                true
            }
            (CircuitState::Closed, FailureKind::Expected) => {
                record.failure_count >= self.config.failure_threshold
            }
        };

        if open && record.state != CircuitState::Open {
            warn!(
                circuit = %self.name,
                failures = record.failure_count,
                unexpected = kind == FailureKind::Unexpected,
                "Circuit opened"
            );
        }
        if open {
            record.state = CircuitState::Open;
            record.success_count = 0;
        }
    }
}

/// An admitted call. Releases the Half-Open probe slot even when the
/// caller's future is dropped before the call completes.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Admission<'_> {
    fn settle(&mut self, f: impl FnOnce(&CircuitBreaker, &mut Record)) {
        let mut record = self.breaker.lock();
        if self.probe {
            record.probe_in_flight = false;
        }
        f(self.breaker, &mut record);
        self.settled = true;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(30),
                success_threshold: 2,
            },
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        b.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<(), CircuitError<&'static str>> {
        b.call(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_rejects_without_calling() {
        let b = breaker();
        for _ in 0..3 {
            assert_eq!(fail(&b).await, Err(CircuitError::Inner("boom")));
        }
        assert_eq!(b.state(), CircuitState::Open);

        let calls = AtomicU32::new(0);
        let result = b
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;

        assert!(result.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.stats().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_in_closed_resets_failure_count() {
        let b = breaker();
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        succeed(&b).await.unwrap();
        fail(&b).await.unwrap_err();
        fail(&b).await.unwrap_err();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.stats().failure_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_admits_probe_and_closes_after_successes() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }

        tokio::time::advance(Duration::from_secs(10)).await;
        match fail(&b).await {
            Err(CircuitError::Open { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_secs(20));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(21)).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.stats().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_immediately() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert_eq!(fail(&b).await, Err(CircuitError::Inner("boom")));
        assert_eq!(b.state(), CircuitState::Open);
        assert!(succeed(&b).await.unwrap_err().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_failure_opens_immediately() {
        let b = breaker();
        let result = b
            .call_classified(
                || async { Err::<(), _>("segfault") },
                |_| FailureKind::Unexpected,
            )
            .await;
        assert_eq!(result, Err(CircuitError::Inner("segfault")));
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_single_probe() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe = b.call(|| async move {
            release_rx.await.ok();
            Ok::<_, &'static str>(())
        });
        tokio::pin!(probe);

        // Poll the probe once so it takes the half-open slot.
        assert!(futures_poll_once(probe.as_mut()).await.is_none());
        assert!(succeed(&b).await.unwrap_err().is_open());

        release_tx.send(()).unwrap();
        probe.await.unwrap();
        assert_eq!(b.stats().successful_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_state_and_counters() {
        let b = breaker();
        for _ in 0..3 {
            fail(&b).await.unwrap_err();
        }
        b.reset();
        let stats = b.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.total_calls, 0);
        assert!(stats.secs_since_last_failure.is_none());
    }

    async fn futures_poll_once<F: Future + Unpin>(mut fut: F) -> Option<F::Output> {
        std::future::poll_fn(|cx| {
            std::task::Poll::Ready(match std::pin::Pin::new(&mut fut).poll(cx) {
                std::task::Poll::Ready(v) => Some(v),
                std::task::Poll::Pending => None,
            })
        })
        .await
    }
}
