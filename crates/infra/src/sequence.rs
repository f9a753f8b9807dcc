//! Gapless per-prefix sequence counters.
//!
//! Human-readable identifiers (`ORD-20260828-0001`, `INV-2026-0001`) need a
//! counter that is monotonic and gapless per prefix. A scan-the-last-record
//! approach is a read-then-write race under concurrency, so assignment goes
//! through a dedicated counter serialized per store (the in-memory
//! implementation holds one mutex; a SQL implementation would use a counter
//! row under a row lock).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence state unavailable: {0}")]
    Unavailable(String),
}

/// Issues the next counter value for a prefix, starting at 1.
pub trait SequenceCounter: Send + Sync {
    fn next(&self, prefix: &str) -> Result<u64, SequenceError>;
}

impl<C> SequenceCounter for Arc<C>
where
    C: SequenceCounter + ?Sized,
{
    fn next(&self, prefix: &str) -> Result<u64, SequenceError> {
        (**self).next(prefix)
    }
}

/// In-memory counter map. Gapless and duplicate-free under concurrency
/// because increments happen under one lock.
#[derive(Debug, Default)]
pub struct InMemorySequenceCounter {
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemorySequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceCounter for InMemorySequenceCounter {
    fn next(&self, prefix: &str) -> Result<u64, SequenceError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Unavailable("lock poisoned".to_string()))?;

        let counter = counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn counts_from_one_per_prefix() {
        let counter = InMemorySequenceCounter::new();
        assert_eq!(counter.next("ORD-20260828").unwrap(), 1);
        assert_eq!(counter.next("ORD-20260828").unwrap(), 2);
        assert_eq!(counter.next("ORD-20260829").unwrap(), 1);
        assert_eq!(counter.next("INV-2026").unwrap(), 1);
    }

    #[test]
    fn concurrent_assignment_is_gapless_and_distinct() {
        let counter = Arc::new(InMemorySequenceCounter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                let mut values = Vec::new();
                for _ in 0..25 {
                    values.push(counter.next("ORD-20260828").unwrap());
                }
                values
            }));
        }

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        let distinct: HashSet<u64> = all.iter().copied().collect();
        assert_eq!(distinct.len(), 200);
        assert_eq!(*all.first().unwrap(), 1);
        assert_eq!(*all.last().unwrap(), 200);
    }
}
