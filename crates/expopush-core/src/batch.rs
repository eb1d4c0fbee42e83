//! Work items, batches and per-batch outcomes.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::push::error::{ApiError, PushErrorCode};

/// A logical unit of work that expands into `weight()` sub-operations.
///
/// Items are immutable once handed to the engine; splitting produces new
/// values through [`WorkItem::slice`].
pub trait WorkItem: Clone + Send + Sync + 'static {
    /// Number of sub-operations (and therefore results) this item produces.
    fn weight(&self) -> usize;

    /// Whether the item may be split across batch boundaries.
    fn is_splittable(&self) -> bool {
        false
    }

    /// The sub-item covering sub-units `range` of this item.
    ///
    /// Only called on splittable items, with `range` inside `0..weight()`.
    fn slice(&self, range: Range<usize>) -> Self {
        let _ = range;
        self.clone()
    }
}

impl WorkItem for String {
    fn weight(&self) -> usize {
        1
    }
}

/// A whole item or a fragment of one, as placed in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry<T> {
    /// The item (or the sliced sub-item for a fragment).
    pub item: T,
    /// Position of the original item in the caller's input.
    pub source: usize,
    /// Sub-units of the original item carried by this entry.
    pub units: Range<usize>,
    /// Weight of the original item.
    pub source_weight: usize,
}

impl<T> BatchEntry<T> {
    pub fn weight(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if this entry carries only part of its source item.
    pub fn is_fragment(&self) -> bool {
        self.units.len() != self.source_weight
    }
}

/// A capacity-bounded group of entries handed to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    /// Zero-based, contiguous position in chunker output.
    pub index: usize,
    pub entries: Vec<BatchEntry<T>>,
    /// Sum of the entries' weights.
    pub weight: usize,
}

impl<T> Batch<T> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            entries: Vec::new(),
            weight: 0,
        }
    }

    pub(crate) fn push(&mut self, entry: BatchEntry<T>) {
        self.weight += entry.weight();
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First global index reserved for this batch.
    pub fn offset(&self, capacity: usize) -> usize {
        self.index * capacity
    }

    /// Global index of the sub-unit at `position` within this batch.
    pub fn global_index(&self, capacity: usize, position: usize) -> usize {
        self.offset(capacity) + position
    }

    /// The batch's items, in order.
    pub fn items(&self) -> impl Iterator<Item = &T> + '_ {
        self.entries.iter().map(|e| &e.item)
    }
}

/// Why a whole batch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No structured response was produced (network error, timeout, panic).
    Transport,
    /// The API answered with batch-level business errors.
    Api,
}

/// A failed batch: decoded sub-errors plus a human-readable message for when
/// there are none.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub kind: FailureKind,
    pub errors: Vec<ApiError>,
    pub message: String,
}

impl BatchFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            errors: Vec::new(),
            message: message.into(),
        }
    }

    pub fn api(errors: Vec<ApiError>, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Api,
            errors,
            message: message.into(),
        }
    }
}

impl From<TransportError> for BatchFailure {
    fn from(err: TransportError) -> Self {
        let message = err.to_string();
        match err {
            TransportError::Api { errors, .. } => Self::api(errors, message),
            TransportError::RateLimited => Self::api(
                vec![ApiError::new(PushErrorCode::TooManyRequests, message.clone())],
                message,
            ),
            _ => Self::transport(message),
        }
    }
}

/// Result of running one batch through the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome<R> {
    /// One result per sub-unit, in batch order.
    Success(Vec<R>),
    Failure(BatchFailure),
}

impl<R> BatchOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl<R> From<Result<Vec<R>, TransportError>> for BatchOutcome<R> {
    fn from(result: Result<Vec<R>, TransportError>) -> Self {
        match result {
            Ok(values) => Self::Success(values),
            Err(err) => Self::Failure(err.into()),
        }
    }
}
