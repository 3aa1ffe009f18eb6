use crate::reorder::Sequenced;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte size an item contributes to a batch.
pub trait MessageSize {
    fn size_bytes(&self) -> u64;
}

impl MessageSize for Vec<u8> {
    fn size_bytes(&self) -> u64 {
        self.len() as u64
    }
}

impl MessageSize for String {
    fn size_bytes(&self) -> u64 {
        self.len() as u64
    }
}

/// A signed transaction submitted for ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub tx_id: String,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Envelope {
    pub fn new(tx_id: impl Into<String>, payload: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            tx_id: tx_id.into(),
            payload,
            signature,
        }
    }
}

impl MessageSize for Envelope {
    /// Payload plus signature; the id travels inside the payload.
    fn size_bytes(&self) -> u64 {
        (self.payload.len() + self.signature.len()) as u64
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitsError {
    #[error("preferred_max_bytes must be greater than zero")]
    ZeroPreferredMaxBytes,

    #[error("max_message_count must be greater than zero")]
    ZeroMaxMessageCount,
}

/// Thresholds that decide when a forming batch is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Soft byte ceiling; only a single oversized item may exceed it.
    pub preferred_max_bytes: u32,
    pub max_message_count: u32,
}

impl BatchLimits {
    pub fn new(preferred_max_bytes: u32, max_message_count: u32) -> Self {
        Self {
            preferred_max_bytes,
            max_message_count,
        }
    }

    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.preferred_max_bytes == 0 {
            return Err(LimitsError::ZeroPreferredMaxBytes);
        }
        if self.max_message_count == 0 {
            return Err(LimitsError::ZeroMaxMessageCount);
        }
        Ok(())
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            preferred_max_bytes: 512 * 1024,
            max_message_count: 10,
        }
    }
}

/// A contiguous run of items cut from the ordered stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    items: Vec<Sequenced<T>>,
    total_bytes: u64,
}

impl<T> Batch<T> {
    pub(crate) fn new(items: Vec<Sequenced<T>>, total_bytes: u64) -> Self {
        Self { items, total_bytes }
    }

    pub fn items(&self) -> &[Sequenced<T>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Sequenced<T>> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn first_sequence(&self) -> Option<u64> {
        self.items.first().map(|i| i.sequence)
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.items.last().map(|i| i.sequence)
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.items.iter().map(|i| i.sequence).collect()
    }
}

/// Result of scheduling one item.
#[derive(Debug)]
pub struct ScheduleOutcome<T> {
    /// Batches cut by this call, in order.
    pub batches: Vec<Batch<T>>,
    /// Whether anything is still buffered: gap-blocked items or a forming batch.
    pub pending: bool,
}
