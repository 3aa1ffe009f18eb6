use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Highest sequence a buffer accepts. `u64::MAX` is reserved so the release
/// cursor can always move past the last accepted item.
pub const MAX_SEQUENCE: u64 = u64::MAX - 1;

/// An item tagged with its position in the canonical delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<T> {
    pub sequence: u64,
    pub payload: T,
}

/// What to do when a sequence that is already pending is pushed again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Overwrite,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("duplicate sequence {sequence}: already pending")]
    Duplicate { sequence: u64 },

    #[error("sequence {sequence} already released (next expected is {next_expected})")]
    AlreadyReleased { sequence: u64, next_expected: u64 },

    #[error("sequence {sequence} is out of range (maximum is {})", MAX_SEQUENCE)]
    OutOfRange { sequence: u64 },
}

/// Holds out-of-order arrivals until their predecessors have arrived.
///
/// Items are released strictly in sequence order, starting at the buffer's
/// starting boundary, and only as a gapless prefix: an item with sequence N is
/// never released before every sequence in `start..N` has been released.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next_expected: u64,
    pending: BTreeMap<u64, T>,
    duplicates: DuplicatePolicy,
}

impl<T> ReorderBuffer<T> {
    pub fn new(duplicates: DuplicatePolicy) -> Self {
        Self::with_start(0, duplicates)
    }

    /// Create a buffer whose first released sequence is `next_expected`.
    pub fn with_start(next_expected: u64, duplicates: DuplicatePolicy) -> Self {
        Self {
            next_expected,
            pending: BTreeMap::new(),
            duplicates,
        }
    }

    /// Insert an item. It stays pending until every earlier sequence has been
    /// released.
    pub fn push(&mut self, sequence: u64, item: T) -> Result<(), ReorderError> {
        if sequence > MAX_SEQUENCE {
            return Err(ReorderError::OutOfRange { sequence });
        }

        if sequence < self.next_expected {
            return Err(ReorderError::AlreadyReleased {
                sequence,
                next_expected: self.next_expected,
            });
        }

        if self.pending.contains_key(&sequence) {
            match self.duplicates {
                DuplicatePolicy::Reject => return Err(ReorderError::Duplicate { sequence }),
                DuplicatePolicy::Overwrite => {
                    warn!(sequence, "Overwriting pending item with duplicate sequence");
                }
            }
        }

        self.pending.insert(sequence, item);
        Ok(())
    }

    /// Release the next item if its sequence is the one expected.
    pub fn pop_ready(&mut self) -> Option<Sequenced<T>> {
        let sequence = self.next_expected;
        let payload = self.pending.remove(&sequence)?;
        self.next_expected += 1;
        Some(Sequenced { sequence, payload })
    }

    /// Release the whole gapless prefix, in order.
    pub fn drain_ready(&mut self) -> Vec<Sequenced<T>> {
        let mut ready = Vec::new();
        while let Some(item) = self.pop_ready() {
            ready.push(item);
        }
        ready
    }

    pub fn has_ready(&self) -> bool {
        self.pending.contains_key(&self.next_expected)
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Smallest sequence still waiting, if any.
    pub fn lowest_pending(&self) -> Option<u64> {
        self.pending.keys().next().copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicates
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}
