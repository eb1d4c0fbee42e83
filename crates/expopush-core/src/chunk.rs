//! Greedy capacity-bounded chunking with item splitting.
//!
//! Items are packed in input order. An item that fits the current batch is
//! appended whole; a splittable item that does not fit tops up the current
//! batch, fills as many full batches as it can and leaves its tail open for
//! the next item. An unsplittable item that does not fit starts a new batch.

use std::mem;
use std::ops::Range;

use crate::batch::{Batch, BatchEntry, WorkItem};
use crate::error::EngineError;

/// Split `items` into batches whose weight never exceeds `capacity`.
///
/// Fails before producing anything if `capacity` is zero, an item has zero
/// weight, or an unsplittable item is heavier than `capacity`.
pub fn chunk<T: WorkItem>(items: &[T], capacity: usize) -> Result<Vec<Batch<T>>, EngineError> {
    validate(items, capacity)?;

    let mut batches = Vec::new();
    let mut current = Batch::new(0);

    for (source, item) in items.iter().enumerate() {
        let weight = item.weight();
        let remaining = capacity - current.weight;

        if weight <= remaining {
            current.push(whole(item, source));
        } else if item.is_splittable() {
            // `current` is never full here, so the top-up is non-empty.
            current.push(fragment(item, source, 0..remaining));
            close(&mut batches, &mut current);

            let mut start = remaining;
            while weight - start >= capacity {
                current.push(fragment(item, source, start..start + capacity));
                close(&mut batches, &mut current);
                start += capacity;
            }
            if start < weight {
                current.push(fragment(item, source, start..weight));
            }
            continue;
        } else {
            close(&mut batches, &mut current);
            current.push(whole(item, source));
        }

        if current.weight == capacity {
            close(&mut batches, &mut current);
        }
    }

    if !current.is_empty() {
        batches.push(current);
    }

    tracing::trace!(
        items = items.len(),
        batches = batches.len(),
        capacity,
        "chunked work items"
    );

    Ok(batches)
}

fn validate<T: WorkItem>(items: &[T], capacity: usize) -> Result<(), EngineError> {
    if capacity < 1 {
        return Err(EngineError::invalid("capacity must be at least 1"));
    }
    for (source, item) in items.iter().enumerate() {
        let weight = item.weight();
        if weight == 0 {
            return Err(EngineError::invalid(format!(
                "item {source} has zero weight"
            )));
        }
        if weight > capacity && !item.is_splittable() {
            return Err(EngineError::invalid(format!(
                "item {source} has weight {weight} but cannot be split to fit capacity {capacity}"
            )));
        }
    }
    Ok(())
}

fn whole<T: WorkItem>(item: &T, source: usize) -> BatchEntry<T> {
    let weight = item.weight();
    BatchEntry {
        item: item.clone(),
        source,
        units: 0..weight,
        source_weight: weight,
    }
}

fn fragment<T: WorkItem>(item: &T, source: usize, units: Range<usize>) -> BatchEntry<T> {
    BatchEntry {
        item: item.slice(units.clone()),
        source,
        units,
        source_weight: item.weight(),
    }
}

fn close<T>(batches: &mut Vec<Batch<T>>, current: &mut Batch<T>) {
    if current.is_empty() {
        return;
    }
    let next = Batch::new(current.index + 1);
    batches.push(mem::replace(current, next));
}
