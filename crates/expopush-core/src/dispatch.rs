//! Bounded-concurrency, rate-limited batch dispatch.
//!
//! A fixed pool of workers drains a FIFO queue of batches. Each worker takes
//! a rate-limiter token before every handler call, so at most `concurrency`
//! calls are in flight and at most `permits` calls start per window. Every
//! batch is attempted; outcomes are returned by batch position no matter in
//! which order they settled.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::batch::{Batch, BatchFailure, BatchOutcome};
use crate::error::EngineError;
use crate::handler::BatchHandler;
use crate::policy::{RateLimitConfig, RateLimiter};

/// What to do with batches not yet started once one batch has failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Attempt every batch regardless of sibling failures.
    #[default]
    CollectAll,
    /// Stop starting new batches after the first failure. Batches already in
    /// flight still complete; the rest settle as skipped failures.
    FailFast,
}

pub(crate) const SKIPPED_MESSAGE: &str = "batch skipped after an earlier batch failed";

type Queue<T> = Mutex<VecDeque<(usize, Batch<T>)>>;

/// Worker pool configuration plus the limiter its workers share.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    concurrency: usize,
    policy: FailurePolicy,
    limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    pub fn new(
        concurrency: usize,
        policy: FailurePolicy,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, EngineError> {
        if concurrency < 1 {
            return Err(EngineError::invalid("concurrency must be at least 1"));
        }
        Ok(Self::from_parts(concurrency, policy, limiter))
    }

    /// Build without validation; `concurrency` is clamped to at least 1.
    pub(crate) fn from_parts(
        concurrency: usize,
        policy: FailurePolicy,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            concurrency: concurrency.max(1),
            policy,
            limiter,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every batch through `handler` and return one outcome per batch,
    /// in input order.
    ///
    /// A success must carry exactly one result per sub-unit of its batch;
    /// any other count settles the batch as a failure.
    pub async fn run<T, R, H>(&self, batches: Vec<Batch<T>>, handler: Arc<H>) -> Vec<BatchOutcome<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        H: BatchHandler<T, R> + ?Sized,
    {
        let total = batches.len();
        if total == 0 {
            return Vec::new();
        }

        let queue: Arc<Queue<T>> = Arc::new(Mutex::new(batches.into_iter().enumerate().collect()));
        let failed = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, BatchOutcome<R>)>();

        let workers = self.concurrency.min(total);
        tracing::debug!(batches = total, workers, "starting dispatch");

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue = queue.clone();
            let failed = failed.clone();
            let limiter = self.limiter.clone();
            let handler = handler.clone();
            let tx = tx.clone();
            let fail_fast = self.policy == FailurePolicy::FailFast;

            handles.push(tokio::spawn(async move {
                while let Some((position, batch)) = next_batch(&queue) {
                    let outcome = if fail_fast && failed.load(Ordering::SeqCst) {
                        tracing::debug!(batch = batch.index, worker, "skipping batch");
                        BatchOutcome::Failure(BatchFailure::transport(SKIPPED_MESSAGE))
                    } else {
                        limiter.acquire().await;
                        run_batch(handler.as_ref(), batch, worker).await
                    };

                    if !outcome.is_success() {
                        failed.store(true, Ordering::SeqCst);
                    }
                    if tx.send((position, outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut slots: Vec<Option<BatchOutcome<R>>> = (0..total).map(|_| None).collect();
        while let Some((position, outcome)) = rx.recv().await {
            slots[position] = Some(outcome);
        }

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "dispatch worker exited abnormally");
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.unwrap_or_else(|| {
                    BatchOutcome::Failure(BatchFailure::transport(format!(
                        "batch {position} produced no outcome"
                    )))
                })
            })
            .collect()
    }
}

/// Dispatch `batches` with a limiter private to this call.
pub async fn dispatch<T, R, H>(
    batches: Vec<Batch<T>>,
    concurrency: usize,
    rate_limit: RateLimitConfig,
    handler: Arc<H>,
) -> Result<Vec<BatchOutcome<R>>, EngineError>
where
    T: Send + 'static,
    R: Send + 'static,
    H: BatchHandler<T, R> + ?Sized,
{
    rate_limit.validate()?;
    let limiter = Arc::new(RateLimiter::new(rate_limit));
    let dispatcher = Dispatcher::new(concurrency, FailurePolicy::CollectAll, limiter)?;
    Ok(dispatcher.run(batches, handler).await)
}

fn next_batch<T>(queue: &Queue<T>) -> Option<(usize, Batch<T>)> {
    queue
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .pop_front()
}

async fn run_batch<T, R, H>(handler: &H, batch: Batch<T>, worker: usize) -> BatchOutcome<R>
where
    H: BatchHandler<T, R> + ?Sized,
{
    let index = batch.index;
    let weight = batch.weight;
    tracing::debug!(batch = index, worker, weight, "dispatching batch");

    let outcome = match AssertUnwindSafe(handler.handle(batch)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            tracing::error!(batch = index, worker, panic = %msg, "batch handler panicked");
            BatchOutcome::Failure(BatchFailure::transport(format!(
                "batch handler panicked: {msg}"
            )))
        }
    };
    let outcome = check_result_count(outcome, weight);

    match &outcome {
        BatchOutcome::Success(values) => {
            tracing::debug!(batch = index, worker, results = values.len(), "batch succeeded");
        }
        BatchOutcome::Failure(failure) => {
            tracing::warn!(
                batch = index,
                worker,
                kind = ?failure.kind,
                errors = failure.errors.len(),
                message = %failure.message,
                "batch failed"
            );
        }
    }
    outcome
}

fn check_result_count<R>(outcome: BatchOutcome<R>, weight: usize) -> BatchOutcome<R> {
    match outcome {
        BatchOutcome::Success(values) if values.len() != weight => BatchOutcome::Failure(
            BatchFailure::transport(result_count_message(weight, values.len())),
        ),
        other => other,
    }
}

pub(crate) fn result_count_message(expected: usize, got: usize) -> String {
    format!("expected {expected} results, got {got}")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::batch::FailureKind;
    use crate::chunk::chunk;
    use crate::handler::handler_fn;

    fn id_batches(count: usize, capacity: usize) -> Vec<Batch<String>> {
        let ids: Vec<String> = (0..count).map(|i| i.to_string()).collect();
        chunk(&ids, capacity).unwrap()
    }

    fn unlimited() -> RateLimitConfig {
        RateLimitConfig::per_second(u32::MAX)
    }

    #[tokio::test]
    async fn outcomes_follow_batch_order_not_completion_order() {
        let batches = id_batches(40, 4);
        let handler = Arc::new(handler_fn(|batch: Batch<String>| async move {
            // Later batches finish first.
            tokio::time::sleep(Duration::from_millis(((10 - batch.index) * 3) as u64)).await;
            BatchOutcome::Success(vec![batch.index; batch.weight])
        }));

        let outcomes = dispatch(batches, 4, unlimited(), handler).await.unwrap();
        assert_eq!(outcomes.len(), 10);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome, &BatchOutcome::Success(vec![i; 4]));
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        for limit in [1, 3, 6] {
            let in_flight = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let handler = {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                Arc::new(handler_fn(move |batch: Batch<String>| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis((batch.index % 5) as u64 + 1)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        BatchOutcome::<()>::Success(vec![(); batch.weight])
                    }
                }))
            };

            dispatch(id_batches(25, 1), limit, unlimited(), handler).await.unwrap();
            let peak = peak.load(Ordering::SeqCst);
            assert!(peak <= limit, "peak {peak} exceeded limit {limit}");
            assert!(peak >= 1);
        }
    }

    #[tokio::test]
    async fn failures_do_not_affect_siblings() {
        let handler = Arc::new(handler_fn(|batch: Batch<String>| async move {
            if batch.index % 2 == 1 {
                BatchOutcome::Failure(BatchFailure::transport("connection reset"))
            } else {
                BatchOutcome::Success(vec![true; batch.weight])
            }
        }));

        let outcomes = dispatch(id_batches(10, 2), 2, unlimited(), handler).await.unwrap();
        assert_eq!(outcomes.len(), 5);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.is_success(), i % 2 == 0);
        }
    }

    #[tokio::test]
    async fn panicking_handler_fails_only_its_batch() {
        let handler = Arc::new(handler_fn(|batch: Batch<String>| async move {
            if batch.index == 1 {
                panic!("boom");
            }
            BatchOutcome::Success(vec![0u8; batch.weight])
        }));

        let outcomes = dispatch(id_batches(9, 3), 2, unlimited(), handler).await.unwrap();
        assert!(outcomes[0].is_success());
        assert!(outcomes[2].is_success());
        match &outcomes[1] {
            BatchOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Transport);
                assert!(failure.message.contains("boom"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_spaces_out_starts() {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let starts = starts.clone();
            Arc::new(handler_fn(move |batch: Batch<String>| {
                let starts = starts.clone();
                async move {
                    starts.lock().unwrap().push(tokio::time::Instant::now());
                    BatchOutcome::Success(vec![(); batch.weight])
                }
            }))
        };

        let rate = RateLimitConfig {
            permits: 2,
            window: Duration::from_secs(1),
        };
        let begin = tokio::time::Instant::now();
        let outcomes = dispatch(id_batches(6, 1), 6, rate, handler).await.unwrap();
        assert!(outcomes.iter().all(BatchOutcome::is_success));

        let mut offsets: Vec<u128> = starts
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(begin).as_millis())
            .collect();
        offsets.sort_unstable();
        assert_eq!(offsets.len(), 6);
        // Two starts per rolling second.
        for (i, offset) in offsets.iter().enumerate() {
            assert!(*offset >= (i as u128 / 2) * 1_000, "offsets {offsets:?}");
        }
    }

    #[tokio::test]
    async fn fail_fast_skips_unstarted_batches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = calls.clone();
            Arc::new(handler_fn(move |batch: Batch<String>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if batch.index == 0 {
                        BatchOutcome::Failure(BatchFailure::transport("down"))
                    } else {
                        BatchOutcome::Success(vec![(); batch.weight])
                    }
                }
            }))
        };

        let limiter = Arc::new(RateLimiter::new(unlimited()));
        let dispatcher = Dispatcher::new(1, FailurePolicy::FailFast, limiter).unwrap();
        let outcomes = dispatcher.run(id_batches(4, 1), handler).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.len(), 4);
        for outcome in &outcomes[1..] {
            match outcome {
                BatchOutcome::Failure(failure) => assert_eq!(failure.message, SKIPPED_MESSAGE),
                other => panic!("expected skipped batch, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn wrong_result_count_fails_the_batch() {
        let handler = Arc::new(handler_fn(|batch: Batch<String>| async move {
            let count = match batch.index {
                0 => batch.weight - 1,
                1 => batch.weight + 1,
                _ => batch.weight,
            };
            BatchOutcome::Success(vec![0u8; count])
        }));

        let outcomes = dispatch(id_batches(12, 4), 2, unlimited(), handler).await.unwrap();
        for (i, expected) in [(0, "expected 4 results, got 3"), (1, "expected 4 results, got 5")] {
            match &outcomes[i] {
                BatchOutcome::Failure(failure) => {
                    assert_eq!(failure.kind, FailureKind::Transport);
                    assert_eq!(failure.message, expected);
                }
                other => panic!("expected failure, got {other:?}"),
            }
        }
        assert_eq!(outcomes[2], BatchOutcome::Success(vec![0u8; 4]));
    }

    #[tokio::test]
    async fn empty_input_returns_immediately() {
        let handler = Arc::new(handler_fn(|_: Batch<String>| async move {
            BatchOutcome::<()>::Success(vec![])
        }));
        let outcomes = dispatch(Vec::new(), 3, unlimited(), handler).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn zero_concurrency_rejected() {
        let handler = Arc::new(handler_fn(|_: Batch<String>| async move {
            BatchOutcome::<()>::Success(vec![])
        }));
        let err = dispatch(id_batches(1, 1), 0, unlimited(), handler)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }
}
