//! Reassembly of per-batch outcomes into one index-stable result.
//!
//! Batch `i` owns global indices `i * capacity .. (i + 1) * capacity`. A
//! successful batch fills its range from the start; a failed batch leaves the
//! whole range empty and records one error-log entry per decoded sub-error
//! (or one generic entry when there are none) spanning that range.

use serde::Serialize;

use crate::batch::{BatchFailure, BatchOutcome};
use crate::collection::{ErrorLog, ResultCollection};
use crate::error::EngineError;
use crate::push::error::{PushError, PushErrorCode};

/// The output of a batched run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchRun<R> {
    pub results: ResultCollection<R>,
    pub errors: ErrorLog,
}

impl<R> Default for BatchRun<R> {
    fn default() -> Self {
        Self {
            results: ResultCollection::new(),
            errors: ErrorLog::new(),
        }
    }
}

impl<R> BatchRun<R> {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Fold `(batch_index, outcome)` pairs, in any order, into results and an
/// error log ordered by batch index.
pub fn aggregate<R, I>(outcomes: I, capacity: usize) -> Result<BatchRun<R>, EngineError>
where
    I: IntoIterator<Item = (usize, BatchOutcome<R>)>,
{
    if capacity < 1 {
        return Err(EngineError::invalid("capacity must be at least 1"));
    }

    let mut settled: Vec<_> = outcomes.into_iter().collect();
    settled.sort_by_key(|(index, _)| *index);

    let mut run = BatchRun::default();
    for (index, outcome) in settled {
        let (offset, end) = index_range(index, capacity)?;
        match outcome {
            BatchOutcome::Success(values) => {
                if values.len() > capacity {
                    tracing::warn!(
                        batch = index,
                        results = values.len(),
                        capacity,
                        "batch returned more results than its range holds; extra results dropped"
                    );
                }
                for (position, value) in values.into_iter().take(capacity).enumerate() {
                    run.results.set(offset + position, value);
                }
            }
            BatchOutcome::Failure(failure) => {
                record_failure(&mut run.errors, failure, offset, end);
            }
        }
    }

    Ok(run)
}

/// First and last global index owned by batch `index`.
fn index_range(index: usize, capacity: usize) -> Result<(usize, usize), EngineError> {
    index
        .checked_mul(capacity)
        .and_then(|offset| Some((offset, offset.checked_add(capacity - 1)?)))
        .ok_or_else(|| {
            EngineError::invalid(format!(
                "batch index {index} with capacity {capacity} overflows the index space"
            ))
        })
}

fn record_failure(log: &mut ErrorLog, failure: BatchFailure, start_index: usize, end_index: usize) {
    if failure.errors.is_empty() {
        log.push(PushError {
            code: PushErrorCode::Failed,
            message: failure.message,
            details: None,
            start_index,
            end_index,
        });
        return;
    }

    for error in failure.errors {
        log.push(PushError {
            code: error.code,
            message: error.message,
            details: error.details,
            start_index,
            end_index,
        });
    }
}
