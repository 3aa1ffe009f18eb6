use crate::cutter::batch::{Batch, BatchLimits, LimitsError, MessageSize, ScheduleOutcome};
use crate::metrics::FillDurationRecorder;
use crate::reorder::{DuplicatePolicy, ReorderBuffer, ReorderError, Sequenced};
use crate::sequence::{SequenceError, SequenceResolver};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid batch limits: {0}")]
    Limits(#[from] LimitsError),

    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("reorder error: {0}")]
    Reorder(#[from] ReorderError),

    #[error("cannot move the starting boundary after scheduling began (next sequence {next_sequence})")]
    AlreadyStarted { next_sequence: u64 },
}

/// Reorders incoming items and cuts the ordered stream into batches bounded by
/// byte size and item count.
///
/// Runs entirely on the caller's stack. All mutation goes through `&mut self`,
/// so one cutter serves exactly one writer (one per channel).
pub struct BatchCutter<T> {
    channel_id: String,
    recorder: Arc<dyn FillDurationRecorder>,
    resolver: SequenceResolver,
    reorder: ReorderBuffer<T>,
    /// Released but not yet cut, with each item's byte size.
    forming: Vec<(Sequenced<T>, u64)>,
    /// First sequence of the stream.
    origin: u64,
    start_sequence: u64,
    accumulated_bytes: u64,
    started_at: Option<Instant>,
}

impl<T: MessageSize> BatchCutter<T> {
    pub fn new(
        channel_id: impl Into<String>,
        recorder: Arc<dyn FillDurationRecorder>,
        resolver: SequenceResolver,
        duplicates: DuplicatePolicy,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            recorder,
            resolver,
            reorder: ReorderBuffer::new(duplicates),
            forming: Vec::new(),
            origin: 0,
            start_sequence: 0,
            accumulated_bytes: 0,
            started_at: None,
        }
    }

    /// Start the ordered stream at `sequence` instead of 0.
    ///
    /// Fails once anything has been accepted, released or cut.
    pub fn starting_at(mut self, sequence: u64) -> Result<Self, ScheduleError> {
        if !self.reorder.is_empty() || self.reorder.next_expected() != self.origin {
            return Err(ScheduleError::AlreadyStarted {
                next_sequence: self.reorder.next_expected(),
            });
        }

        self.reorder = ReorderBuffer::with_start(sequence, self.duplicate_policy());
        self.origin = sequence;
        self.start_sequence = sequence;
        Ok(self)
    }

    /// Schedule an item identified by its transaction id.
    ///
    /// Items whose id is malformed are handled per the resolver's policy; a
    /// dropped item yields no batches.
    pub fn schedule(
        &mut self,
        item: T,
        tx_id: &str,
        limits: &BatchLimits,
    ) -> Result<ScheduleOutcome<T>, ScheduleError> {
        limits.validate()?;

        let Some(sequence) = self.resolver.resolve(tx_id)? else {
            return Ok(ScheduleOutcome {
                batches: Vec::new(),
                pending: self.has_pending(),
            });
        };

        self.schedule_sequenced(sequence, item, limits)
    }

    /// Schedule an item whose sequence is already known.
    pub fn schedule_sequenced(
        &mut self,
        sequence: u64,
        item: T,
        limits: &BatchLimits,
    ) -> Result<ScheduleOutcome<T>, ScheduleError> {
        limits.validate()?;
        self.reorder.push(sequence, item)?;

        let mut batches = Vec::new();
        while let Some(released) = self.reorder.pop_ready() {
            self.admit(released, limits, &mut batches);
        }

        Ok(ScheduleOutcome {
            batches,
            pending: self.has_pending(),
        })
    }

    /// Fold one released item into the forming batch, cutting as thresholds
    /// are reached.
    fn admit(&mut self, released: Sequenced<T>, limits: &BatchLimits, batches: &mut Vec<Batch<T>>) {
        let size = released.payload.size_bytes();
        let next = released.sequence + 1;
        let preferred = u64::from(limits.preferred_max_bytes);

        if self.forming.is_empty() {
            self.started_at = Some(Instant::now());
        }
        self.forming.push((released, size));

        let new_total = self.accumulated_bytes + size;
        match new_total.cmp(&preferred) {
            Ordering::Less => self.accumulated_bytes = new_total,
            Ordering::Equal => batches.push(self.cut(next)),
            Ordering::Greater => {
                if self.forming.len() == 1 {
                    // A single item already over the threshold goes alone
                    batches.push(self.cut(next));
                } else {
                    batches.push(self.cut(next - 1));
                    if size >= preferred {
                        batches.push(self.cut(next));
                    }
                }
            }
        }

        if self.forming.len() >= limits.max_message_count as usize {
            batches.push(self.cut(next));
        }
    }

    /// Cut every forming item with a sequence below `end_sequence`.
    ///
    /// # Panics
    ///
    /// Panics if `end_sequence` does not lie within the forming batch, i.e.
    /// `end_sequence <= start` or beyond the last released item. Either means
    /// the cutter's bookkeeping is corrupt.
    pub fn cut(&mut self, end_sequence: u64) -> Batch<T> {
        let start = self.start_sequence;
        let released_end = self.reorder.next_expected();

        if end_sequence <= start || end_sequence > released_end {
            error!(
                channel = %self.channel_id,
                start,
                end_sequence,
                released_end,
                "Batch cut outside the forming batch"
            );
            panic!(
                "BatchCutter::cut does not allow start >= end or cutting unreleased items \
                 (start {}, end {}, released up to {})",
                start, end_sequence, released_end
            );
        }

        let elapsed = self
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.recorder.observe(&self.channel_id, elapsed);

        let count = (end_sequence - start) as usize;
        let mut total_bytes = 0;
        let items: Vec<Sequenced<T>> = self
            .forming
            .drain(..count)
            .map(|(item, size)| {
                total_bytes += size;
                item
            })
            .collect();

        self.start_sequence = end_sequence;
        self.accumulated_bytes = self.forming.iter().map(|(_, size)| *size).sum();
        self.started_at = if self.forming.is_empty() {
            None
        } else {
            Some(Instant::now())
        };

        debug!(
            channel = %self.channel_id,
            first = start,
            last = end_sequence - 1,
            total_bytes,
            fill_ms = elapsed.as_millis() as u64,
            "Cut batch"
        );

        Batch::new(items, total_bytes)
    }

    /// Cut the whole forming batch, if there is one.
    pub fn flush(&mut self) -> Option<Batch<T>> {
        if self.forming.is_empty() {
            return None;
        }
        let end = self.reorder.next_expected();
        Some(self.cut(end))
    }
}

impl<T> BatchCutter<T> {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Gap-blocked items or a forming batch remain.
    pub fn has_pending(&self) -> bool {
        !self.reorder.is_empty() || !self.forming.is_empty()
    }

    /// When the current forming batch began accumulating.
    pub fn forming_started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn forming_len(&self) -> usize {
        self.forming.len()
    }

    pub fn forming_bytes(&self) -> u64 {
        self.accumulated_bytes
    }

    /// Next sequence the cutter is waiting for.
    pub fn next_sequence(&self) -> u64 {
        self.reorder.next_expected()
    }

    /// Number of items waiting behind a gap.
    pub fn gap_blocked(&self) -> usize {
        self.reorder.pending_len()
    }

    fn duplicate_policy(&self) -> DuplicatePolicy {
        self.reorder.duplicate_policy()
    }
}

impl<T> std::fmt::Debug for BatchCutter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCutter")
            .field("channel_id", &self.channel_id)
            .field("start_sequence", &self.start_sequence)
            .field("next_sequence", &self.reorder.next_expected())
            .field("forming", &self.forming.len())
            .field("accumulated_bytes", &self.accumulated_bytes)
            .field("gap_blocked", &self.reorder.pending_len())
            .finish()
    }
}
