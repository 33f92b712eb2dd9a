//! Fail injection for any CRUD service.
//!
//! [`FailInjectingService`] wraps another service and adds:
//!
//! - **Failure rate**: probability of answering with a `Service` error
//! - **Delay injection**: uniform latency to simulate a slow network
//! - **Timeout simulation**: probability of answering with a timeout error
//!
//! Random draws come from a `StdRng` that can be seeded for reproducible
//! runs. The draws for a call are taken before the call is awaited, so the
//! RNG lock is never held across an await point.

use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::{ServiceFuture, TodoError, TodoService};
use crate::domain::{NewTodo, Todo, TodoId, TodoPatch};

// =============================================================================
// Fail Injection Config
// =============================================================================

/// When an injected failure replaces the inner call's result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InjectionPhase {
    /// The inner service is not called; nothing is written.
    #[default]
    Before,
    /// The inner service is called first and its result is discarded, which
    /// simulates a write that succeeded but whose answer was lost.
    After,
}

/// Configuration for fail injection.
#[derive(Debug, Clone)]
pub struct FailInjectionConfig {
    /// Probability of injecting a failure (0.0 - 1.0).
    pub failure_rate: f64,
    /// Minimum delay in milliseconds.
    pub delay_min_ms: u64,
    /// Maximum delay in milliseconds.
    pub delay_max_ms: u64,
    /// Probability of simulating a timeout (0.0 - 1.0).
    pub timeout_rate: f64,
    /// Timeout value reported in the timeout error.
    pub timeout_ms: u64,
    pub phase: InjectionPhase,
    /// Fixed RNG seed. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for FailInjectionConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            delay_min_ms: 0,
            delay_max_ms: 0,
            timeout_rate: 0.0,
            timeout_ms: 5000,
            phase: InjectionPhase::Before,
            seed: None,
        }
    }
}

impl FailInjectionConfig {
    /// Creates a seeded configuration with a fixed delay.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn deterministic(
        failure_rate: f64,
        delay_ms: u64,
        timeout_rate: f64,
        seed: u64,
    ) -> Result<Self, FailInjectionConfigError> {
        let config = Self {
            failure_rate,
            delay_min_ms: delay_ms,
            delay_max_ms: delay_ms,
            timeout_rate,
            seed: Some(seed),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub const fn with_phase(mut self, phase: InjectionPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `failure_rate` is not in range `0.0..=1.0`
    /// - `timeout_rate` is not in range `0.0..=1.0`
    /// - `delay_min_ms > delay_max_ms`
    pub fn validate(&self) -> Result<(), FailInjectionConfigError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(FailInjectionConfigError::InvalidFailureRate(
                self.failure_rate,
            ));
        }
        if !(0.0..=1.0).contains(&self.timeout_rate) {
            return Err(FailInjectionConfigError::InvalidTimeoutRate(
                self.timeout_rate,
            ));
        }
        if self.delay_min_ms > self.delay_max_ms {
            return Err(FailInjectionConfigError::InvalidDelayRange {
                min: self.delay_min_ms,
                max: self.delay_max_ms,
            });
        }
        Ok(())
    }

    /// Returns whether fail injection is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.failure_rate > 0.0 || self.delay_max_ms > 0 || self.timeout_rate > 0.0
    }
}

/// Fail injection configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailInjectionConfigError {
    #[error("Invalid failure rate: must be 0.0-1.0, got {0}")]
    InvalidFailureRate(f64),

    #[error("Invalid timeout rate: must be 0.0-1.0, got {0}")]
    InvalidTimeoutRate(f64),

    #[error("Invalid delay range: min ({min}) > max ({max})")]
    InvalidDelayRange { min: u64, max: u64 },
}

// =============================================================================
// Fail Injecting Service
// =============================================================================

/// What to do for one call, drawn up front.
#[derive(Debug)]
struct Injection {
    delay: Duration,
    error: Option<TodoError>,
}

/// A service wrapper that injects latency and failures.
#[derive(Debug)]
pub struct FailInjectingService<S> {
    inner: S,
    config: FailInjectionConfig,
    rng: Mutex<StdRng>,
}

impl<S: TodoService> FailInjectingService<S> {
    /// Wraps `inner` with the given configuration.
    #[must_use]
    pub fn new(inner: S, config: FailInjectionConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            inner,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Returns the wrapped service.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn draw(&self) -> Injection {
        let mut rng = self.rng.lock();
        let delay_ms = if self.config.delay_max_ms == 0 {
            0
        } else if self.config.delay_min_ms == self.config.delay_max_ms {
            self.config.delay_min_ms
        } else {
            rng.random_range(self.config.delay_min_ms..=self.config.delay_max_ms)
        };

        let error = if rng.random::<f64>() < self.config.failure_rate {
            Some(TodoError::service("Injected failure"))
        } else if rng.random::<f64>() < self.config.timeout_rate {
            Some(TodoError::Service(format!(
                "Request timed out after {}ms",
                self.config.timeout_ms
            )))
        } else {
            None
        };

        Injection {
            delay: Duration::from_millis(delay_ms),
            error,
        }
    }

    fn run<'a, T: Send + 'a>(&'a self, call: ServiceFuture<'a, T>) -> ServiceFuture<'a, T> {
        let injection = self.draw();
        let phase = self.config.phase;

        async move {
            if !injection.delay.is_zero() {
                tokio::time::sleep(injection.delay).await;
            }
            match (injection.error, phase) {
                (None, _) => call.await,
                (Some(error), InjectionPhase::Before) => {
                    tracing::debug!(%error, "Injected failure before call");
                    Err(error)
                }
                (Some(error), InjectionPhase::After) => {
                    let discarded = call.await;
                    tracing::debug!(%error, succeeded = discarded.is_ok(), "Injected failure after call");
                    Err(error)
                }
            }
        }
        .boxed()
    }
}

impl<S: TodoService> TodoService for FailInjectingService<S> {
    fn list(&self) -> ServiceFuture<'_, Vec<Todo>> {
        self.run(self.inner.list())
    }

    fn create(&self, new_todo: NewTodo) -> ServiceFuture<'_, Todo> {
        self.run(self.inner.create(new_todo))
    }

    fn update(&self, id: TodoId, patch: TodoPatch) -> ServiceFuture<'_, Todo> {
        self.run(self.inner.update(id, patch))
    }

    fn delete(&self, id: TodoId) -> ServiceFuture<'_, ()> {
        self.run(self.inner.delete(id))
    }
}

// =============================================================================
// Tests
// =============================================================================
