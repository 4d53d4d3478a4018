//! Error taxonomy for the concept graph reasoning engine.
//!
//! The core algorithms are synchronous (see module docs on `store`), so the
//! resilience primitives here - circuit breaker, retry policy - are blocking
//! rather than `async`, unlike the sibling service layers in this codebase.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error taxonomy for the reasoning core and its store adapter.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    /// A concept, predicate, or code lookup came back empty.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// The underlying store entered a must-rollback state. By the time this
    /// is raised the adapter has already rolled back; caches are untouched.
    #[error("store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        source_error: Option<String>,
    },

    /// A caller-supplied argument violates a precondition (negative depth,
    /// empty required seeds, unsupported predicate reference).
    #[error("invalid argument {argument}: {message}")]
    InvalidArgument { message: String, argument: String },

    /// An algorithm hit a hard limit it cannot express via a trace
    /// `terminated_reason` alone.
    #[error("limit exceeded: {limit} (observed {observed})")]
    LimitExceeded { limit: String, observed: String },
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Builder for attaching operation/store context to an error before it is
/// returned to the caller.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    operation: String,
    store: Option<String>,
    metadata: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            store: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Wrap an error, folding this context's operation name into the
    /// `StoreUnavailable` message when present.
    pub fn wrap_err<E: Into<GraphError>>(self, error: E) -> GraphError {
        let err = error.into();
        match err {
            GraphError::StoreUnavailable { message, source_error } => {
                GraphError::StoreUnavailable {
                    message: format!("{}: {}", self.operation, message),
                    source_error,
                }
            }
            other => other,
        }
    }
}

/// Circuit breaker guarding repeated store failures. Blocking: guarded by a
/// plain `Mutex` rather than `tokio::sync::RwLock`, since the core and its
/// adapter run synchronously.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    success_threshold: usize,
    timeout: Duration,
    state: Mutex<CircuitBreakerState>,
}

#[derive(Debug, Clone)]
struct CircuitBreakerState {
    failure_count: usize,
    success_count: usize,
    last_failure: Option<(Instant, String)>,
    state: BreakerState,
}

#[derive(Debug, Clone, PartialEq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: usize,
        success_threshold: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            success_threshold,
            timeout,
            state: Mutex::new(CircuitBreakerState {
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                state: BreakerState::Closed,
            }),
        }
    }

    pub fn check(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        match state.state {
            BreakerState::Open => {
                if let Some((last_failure_time, last_message)) = state.last_failure.clone() {
                    if last_failure_time.elapsed() >= self.timeout {
                        state.state = BreakerState::HalfOpen;
                        state.success_count = 0;
                        state.failure_count = 0;
                        Ok(())
                    } else {
                        Err(GraphError::StoreUnavailable {
                            message: format!(
                                "circuit breaker open for {}, last failure: {}",
                                self.name, last_message
                            ),
                            source_error: None,
                        })
                    }
                } else {
                    state.state = BreakerState::Closed;
                    Ok(())
                }
            }
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        match state.state {
            BreakerState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.success_threshold {
                    state.state = BreakerState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                }
            }
            BreakerState::Closed => {
                state.failure_count = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self, error_message: String) {
        let mut state = self.state.lock().unwrap();
        state.failure_count += 1;
        state.last_failure = Some((Instant::now(), error_message));

        match state.state {
            BreakerState::Closed => {
                if state.failure_count >= self.failure_threshold {
                    state.state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => {
                state.state = BreakerState::Open;
                state.success_count = 0;
            }
            BreakerState::Open => {}
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.state.lock().unwrap();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: format!("{:?}", state.state),
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_ago: state.last_failure.as_ref().map(|(t, _)| t.elapsed()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: String,
    pub failure_count: usize,
    pub success_count: usize,
    pub last_failure_ago: Option<Duration>,
}

/// Retry policy for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let exponential_delay = self.initial_delay.as_millis() as f64
            * self.exponential_base.powi(attempt as i32 - 1);

        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            let jitter_factor = 0.5 + rand::random::<f64>();
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Only store-unavailable failures are worth retrying; `NotFound` and
    /// `InvalidArgument` are not transient.
    pub fn should_retry(error: &GraphError) -> bool {
        matches!(error, GraphError::StoreUnavailable { .. })
    }
}

/// Executes a blocking operation with exponential backoff and an optional
/// circuit breaker, for use by the store adapter.
pub struct RetryExecutor {
    policy: RetryPolicy,
    circuit_breaker: Option<CircuitBreaker>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            circuit_breaker: None,
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    pub fn execute<F, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            if let Some(ref cb) = self.circuit_breaker {
                cb.check()?;
            }

            match operation() {
                Ok(result) => {
                    if let Some(ref cb) = self.circuit_breaker {
                        cb.record_success();
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if let Some(ref cb) = self.circuit_breaker {
                        cb.record_failure(e.to_string());
                    }

                    if !RetryPolicy::should_retry(&e) {
                        return Err(e);
                    }

                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.calculate_delay(attempt);
                        std::thread::sleep(delay);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GraphError::StoreUnavailable {
            message: "retry loop exited without capturing an error".to_string(),
            source_error: None,
        }))
    }
}

/// Extension trait for attaching context to a `Result`.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> ErrorContext;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<GraphError>,
{
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            match base_error {
                GraphError::StoreUnavailable { message, source_error } => {
                    GraphError::StoreUnavailable {
                        message: format!("{}: {}", context, message),
                        source_error,
                    }
                }
                other => other,
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> ErrorContext,
    {
        self.map_err(|e| f().wrap_err(e.into()))
    }
}

impl From<anyhow::Error> for GraphError {
    fn from(err: anyhow::Error) -> Self {
        GraphError::StoreUnavailable {
            message: err.to_string(),
            source_error: None,
        }
    }
}

impl From<sqlx::Error> for GraphError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => GraphError::NotFound {
                kind: "row".to_string(),
                id: "unknown".to_string(),
            },
            other => GraphError::StoreUnavailable {
                message: other.to_string(),
                source_error: Some(other.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_context_prefixes_store_unavailable_message() {
        let error = ErrorContext::new("load_concept")
            .with_store("postgres")
            .wrap_err(GraphError::StoreUnavailable {
                message: "connection reset".to_string(),
                source_error: None,
            });

        match error {
            GraphError::StoreUnavailable { message, .. } => {
                assert_eq!(message, "load_concept: connection reset");
            }
            _ => panic!("unexpected error variant"),
        }
    }

    #[test]
    fn retry_policy_delay_calculation() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
            jitter: false,
            ..Default::default()
        };

        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(800));
        assert_eq!(policy.calculate_delay(5), Duration::from_millis(1000));
    }

    #[test]
    fn circuit_breaker_state_transitions() {
        let cb = CircuitBreaker::new("test", 2, 2, Duration::from_millis(50));

        assert!(cb.check().is_ok());

        cb.record_failure("error 1".to_string());
        assert!(cb.check().is_ok());

        cb.record_failure("error 2".to_string());
        assert!(cb.check().is_err());

        std::thread::sleep(Duration::from_millis(80));
        assert!(cb.check().is_ok());

        cb.record_success();
        assert!(cb.check().is_ok());
        cb.record_success();
        assert!(cb.check().is_ok());
    }

    #[test]
    fn retry_executor_gives_up_on_non_retryable_error() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            exponential_base: 2.0,
            jitter: false,
        });

        let mut calls = 0;
        let result: Result<()> = executor.execute(|| {
            calls += 1;
            Err(GraphError::InvalidArgument {
                message: "bad depth".to_string(),
                argument: "max_depth".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
