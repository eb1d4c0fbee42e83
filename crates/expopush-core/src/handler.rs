//! The per-batch handler seam.

use std::future::Future;

use async_trait::async_trait;

use crate::batch::{Batch, BatchOutcome};

/// Runs one batch against the external transport.
///
/// This is the only place the transport is invoked. Failures of any kind are
/// reported through [`BatchOutcome::Failure`]; a handler never aborts its
/// siblings.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`: one handler is shared by every
/// worker of a dispatch.
#[async_trait]
pub trait BatchHandler<T, R>: Send + Sync + 'static {
    async fn handle(&self, batch: Batch<T>) -> BatchOutcome<R>;
}

/// Adapter turning an async closure into a [`BatchHandler`].
pub struct HandlerFn<F>(F);

/// Wrap `f` so it can be passed where a [`BatchHandler`] is expected.
///
/// ```rust
/// use expopush_core::{handler_fn, Batch, BatchOutcome};
///
/// let handler = handler_fn(|batch: Batch<String>| async move {
///     BatchOutcome::Success(batch.items().map(|id| id.len()).collect::<Vec<_>>())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn(f)
}

#[async_trait]
impl<T, R, F, Fut> BatchHandler<T, R> for HandlerFn<F>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Batch<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BatchOutcome<R>> + Send + 'static,
{
    async fn handle(&self, batch: Batch<T>) -> BatchOutcome<R> {
        (self.0)(batch).await
    }
}
