//! `BatchEngine`: chunk, dispatch, aggregate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, BatchRun};
use crate::batch::WorkItem;
use crate::chunk::chunk;
use crate::dispatch::{Dispatcher, FailurePolicy};
use crate::error::EngineError;
use crate::handler::BatchHandler;
use crate::policy::{RateLimitConfig, RateLimiter};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum handler calls in flight at once.
    pub concurrency: usize,
    /// Limit on handler call starts, shared by every run of the engine.
    pub rate_limit: RateLimitConfig,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            rate_limit: RateLimitConfig::default(),
            failure_policy: FailurePolicy::CollectAll,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.concurrency < 1 {
            return Err(EngineError::invalid("concurrency must be at least 1"));
        }
        self.rate_limit.validate()
    }
}

/// Splits work into batches, runs them through a handler and reassembles the
/// results.
///
/// The rate limiter lives as long as the engine, so back-to-back runs share
/// one request budget.
#[derive(Debug, Clone)]
pub struct BatchEngine {
    dispatcher: Dispatcher,
}

impl BatchEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Ok(Self {
            dispatcher: Dispatcher::new(config.concurrency, config.failure_policy, limiter)?,
        })
    }

    /// Engine with [`EngineConfig::default`], which needs no validation.
    pub fn with_defaults() -> Self {
        let config = EngineConfig::default();
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self {
            dispatcher: Dispatcher::from_parts(config.concurrency, config.failure_policy, limiter),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.dispatcher.concurrency()
    }

    /// Send `items` in batches of at most `capacity` sub-units.
    ///
    /// Returns an error only for input that could never be dispatched; batch
    /// failures are reported in the run's error log, with the results of the
    /// failed range left absent.
    pub async fn send_in_batches<T, R, H>(
        &self,
        items: &[T],
        capacity: usize,
        handler: Arc<H>,
    ) -> Result<BatchRun<R>, EngineError>
    where
        T: WorkItem,
        R: Send + 'static,
        H: BatchHandler<T, R> + ?Sized,
    {
        let batches = chunk(items, capacity)?;
        let units: usize = batches.iter().map(|b| b.weight).sum();
        tracing::info!(
            items = items.len(),
            units,
            batches = batches.len(),
            capacity,
            "sending in batches"
        );

        let outcomes = self.dispatcher.run(batches, handler).await;
        let run = aggregate(outcomes.into_iter().enumerate(), capacity)?;

        if run.has_errors() {
            tracing::warn!(
                results = run.results.len(),
                units,
                errors = run.errors.len(),
                "batched run finished with errors"
            );
        } else {
            tracing::info!(results = run.results.len(), "batched run finished");
        }
        Ok(run)
    }
}
