use crate::config::types::DispatcherConfig;
use crate::dispatch::completion::{completion_pair, Completion, Ticket};
use crate::dispatch::DispatchError;
use crate::pipeline::{create_channel, HighWaterMark, Receiver, Sender};
use crate::reorder::{DuplicatePolicy, ReorderBuffer, SequenceLock};
use crate::sequence::SequenceResolver;
use std::sync::Arc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Queue sizes for the dispatcher
#[derive(Debug, Clone, Copy)]
pub struct DispatcherSettings {
    /// Capacity of the ordered queue read by `pop`.
    pub queue_capacity: usize,
    /// Capacity of the producer-to-worker notification queue.
    pub signal_capacity: usize,
    /// Pending depth that raises the backpressure warning.
    pub high_water_mark: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 100_000,
            signal_capacity: 100_000,
            high_water_mark: 50_000,
        }
    }
}

impl From<&DispatcherConfig> for DispatcherSettings {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            signal_capacity: config.signal_capacity,
            high_water_mark: config.high_water_mark,
        }
    }
}

/// An item released in order, together with its completion handle.
#[derive(Debug)]
pub struct Dispatched<T, R = ()> {
    pub sequence: u64,
    pub payload: T,
    pub completion: Completion<R>,
}

impl<T, R> Dispatched<T, R> {
    /// Complete the item with a response for its submitter.
    pub fn complete(self, response: R) {
        self.completion.complete(response)
    }

    pub fn into_parts(self) -> (u64, T, Completion<R>) {
        (self.sequence, self.payload, self.completion)
    }
}

impl<T> Dispatched<T, ()> {
    pub fn done(self) {
        self.completion.done()
    }
}

struct Waiting<T, R> {
    payload: T,
    completion: Completion<R>,
}

struct Shared<T, R> {
    buffer: SequenceLock<ReorderBuffer<Waiting<T, R>>>,
    resolver: SequenceResolver,
    pending_alarm: HighWaterMark,
}

/// Producer side of an ordered dispatcher. Cheap to clone; every clone feeds
/// the same reorder buffer.
///
/// `push` never waits for the consumer: it holds the buffer lock only to
/// insert, then notifies the worker without blocking.
pub struct OrderedDispatcher<T, R = ()> {
    shared: Arc<Shared<T, R>>,
    signal: Sender<()>,
}

/// Consumer side of an ordered dispatcher. There is exactly one, so items are
/// always observed in sequence order.
pub struct OrderedReceiver<T, R = ()> {
    handoff: Receiver<Dispatched<T, R>>,
}

impl<T, R> OrderedDispatcher<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Start the dispatch worker on the current tokio runtime.
    ///
    /// The worker exits when `cancel` fires or every `OrderedDispatcher`
    /// clone has been dropped; the receiver then yields `None`.
    pub fn spawn(
        settings: DispatcherSettings,
        resolver: SequenceResolver,
        duplicates: DuplicatePolicy,
        cancel: CancellationToken,
    ) -> (Self, OrderedReceiver<T, R>, JoinHandle<()>) {
        let shared = Arc::new(Shared {
            buffer: SequenceLock::new(ReorderBuffer::new(duplicates)),
            resolver,
            pending_alarm: HighWaterMark::new("dispatcher_pending", settings.high_water_mark),
        });

        let (signal_tx, signal_rx) = create_channel(settings.signal_capacity);
        let (handoff_tx, handoff_rx) = create_channel(settings.queue_capacity);

        let worker = tokio::spawn(run_worker(
            Arc::clone(&shared),
            signal_rx,
            handoff_tx,
            cancel,
        ));

        (
            Self {
                shared,
                signal: signal_tx,
            },
            OrderedReceiver {
                handoff: handoff_rx,
            },
            worker,
        )
    }
}

impl<T, R> OrderedDispatcher<T, R> {
    /// Submit an item identified by its transaction id.
    ///
    /// Returns `Ok(None)` when the id is malformed and the resolver's policy
    /// drops such items.
    pub fn push(&self, tx_id: &str, payload: T) -> Result<Option<Ticket<R>>, DispatchError> {
        let Some(sequence) = self.shared.resolver.resolve(tx_id)? else {
            return Ok(None);
        };
        self.push_sequenced(sequence, payload).map(Some)
    }

    /// Submit an item whose sequence is already known.
    pub fn push_sequenced(&self, sequence: u64, payload: T) -> Result<Ticket<R>, DispatchError> {
        if self.signal.is_closed() {
            return Err(DispatchError::Closed);
        }

        let (completion, ticket) = completion_pair(sequence);
        {
            let mut buffer = self.shared.buffer.lock();
            buffer.push(sequence, Waiting { payload, completion })?;
            self.shared.pending_alarm.observe(buffer.pending_len());
        }

        // A full queue already holds a notification the worker has yet to see,
        // and that drain will pick this item up.
        match self.signal.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(ticket),
            Err(TrySendError::Closed(())) => Err(DispatchError::Closed),
        }
    }

    /// Items waiting for an earlier sequence or for the worker.
    pub fn pending_len(&self) -> usize {
        self.shared.buffer.lock().pending_len()
    }

    /// Next sequence the dispatcher will release.
    pub fn next_sequence(&self) -> u64 {
        self.shared.buffer.lock().next_expected()
    }
}

impl<T, R> Clone for OrderedDispatcher<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            signal: self.signal.clone(),
        }
    }
}

impl<T, R> OrderedReceiver<T, R> {
    /// Wait for the next item in sequence order.
    ///
    /// Returns `None` once the dispatcher has shut down and every forwarded
    /// item has been taken.
    pub async fn pop(&mut self) -> Option<Dispatched<T, R>> {
        self.handoff.recv().await
    }

    /// Blocking variant of [`OrderedReceiver::pop`] for callers outside the
    /// runtime.
    pub fn blocking_pop(&mut self) -> Option<Dispatched<T, R>> {
        self.handoff.blocking_recv()
    }

    /// Take the next item if one is already queued.
    pub fn try_pop(&mut self) -> Option<Dispatched<T, R>> {
        self.handoff.try_recv().ok()
    }
}

/// The only task that releases items, so forwarding order is sequence order.
async fn run_worker<T, R>(
    shared: Arc<Shared<T, R>>,
    mut signal: Receiver<()>,
    handoff: Sender<Dispatched<T, R>>,
    cancel: CancellationToken,
) {
    let mut forwarded: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(forwarded, "Dispatcher cancelled");
                return;
            }

            received = signal.recv() => {
                if received.is_none() {
                    debug!(forwarded, "All producers dropped, stopping dispatcher");
                    return;
                }

                // Coalesce queued notifications; one drain serves them all
                loop {
                    match signal.try_recv() {
                        Ok(()) => continue,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                    }
                }

                let ready = {
                    let mut buffer = shared.buffer.lock();
                    let ready = buffer.drain_ready();
                    shared.pending_alarm.observe(buffer.pending_len());
                    ready
                };

                for released in ready {
                    let item = Dispatched {
                        sequence: released.sequence,
                        payload: released.payload.payload,
                        completion: released.payload.completion,
                    };

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!(forwarded, "Dispatcher cancelled");
                            return;
                        }
                        sent = handoff.send(item) => {
                            if sent.is_err() {
                                debug!(forwarded, "Receiver dropped, stopping dispatcher");
                                return;
                            }
                            forwarded += 1;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorder::ReorderError;
    use crate::sequence::{ParseErrorPolicy, RegexSequenceSource};
    use std::time::Duration;

    fn spawn_default<R: Send + 'static>() -> (
        OrderedDispatcher<&'static str, R>,
        OrderedReceiver<&'static str, R>,
        JoinHandle<()>,
    ) {
        OrderedDispatcher::spawn(
            DispatcherSettings::default(),
            SequenceResolver::default(),
            DuplicatePolicy::Reject,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_pop_returns_items_in_sequence_order() {
        let (dispatcher, mut receiver, _worker) = spawn_default::<()>();

        dispatcher.push_sequenced(2, "c").unwrap();
        dispatcher.push_sequenced(1, "b").unwrap();
        dispatcher.push_sequenced(0, "a").unwrap();

        for (expected_seq, expected_payload) in [(0, "a"), (1, "b"), (2, "c")] {
            let item = receiver.pop().await.unwrap();
            assert_eq!(item.sequence, expected_seq);
            assert_eq!(item.payload, expected_payload);
            item.done();
        }
    }

    #[tokio::test]
    async fn test_gap_holds_back_later_items() {
        let (dispatcher, mut receiver, _worker) = spawn_default::<()>();

        dispatcher.push_sequenced(1, "b").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(receiver.try_pop().is_none());
        assert_eq!(dispatcher.pending_len(), 1);

        dispatcher.push_sequenced(0, "a").unwrap();
        assert_eq!(receiver.pop().await.unwrap().sequence, 0);
        assert_eq!(receiver.pop().await.unwrap().sequence, 1);
        assert_eq!(dispatcher.next_sequence(), 2);
    }

    #[tokio::test]
    async fn test_ticket_receives_response() {
        let (dispatcher, mut receiver, _worker) = spawn_default::<usize>();

        let ticket = dispatcher.push("0", "proposal").unwrap().unwrap();

        let processor = tokio::spawn(async move {
            let item = receiver.pop().await.unwrap();
            let response = item.payload.len();
            item.complete(response);
        });

        assert_eq!(ticket.wait().await.unwrap(), "proposal".len());
        processor.await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_push_rejected() {
        let (dispatcher, _receiver, _worker) = spawn_default::<()>();

        dispatcher.push_sequenced(3, "first").unwrap();
        let err = dispatcher.push_sequenced(3, "second").unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Reorder(ReorderError::Duplicate { sequence: 3 })
        ));
    }

    #[tokio::test]
    async fn test_overwritten_duplicate_abandons_first_ticket() {
        let (dispatcher, mut receiver, _worker) = OrderedDispatcher::<&str, ()>::spawn(
            DispatcherSettings::default(),
            SequenceResolver::default(),
            DuplicatePolicy::Overwrite,
            CancellationToken::new(),
        );

        let first = dispatcher.push_sequenced(1, "first").unwrap();
        let second = dispatcher.push_sequenced(1, "second").unwrap();
        assert!(matches!(
            first.wait().await,
            Err(DispatchError::Abandoned { sequence: 1 })
        ));

        dispatcher.push_sequenced(0, "zero").unwrap();
        receiver.pop().await.unwrap().done();
        let item = receiver.pop().await.unwrap();
        assert_eq!(item.payload, "second");
        item.done();
        second.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_id_policies() {
        let (rejecting, _rx, _worker) = spawn_default::<()>();
        assert!(matches!(
            rejecting.push("tx-abc", "x"),
            Err(DispatchError::Sequence(_))
        ));

        let (dropping, _rx2, _worker2) = OrderedDispatcher::<&str, ()>::spawn(
            DispatcherSettings::default(),
            SequenceResolver::new(
                Box::new(RegexSequenceSource::default()),
                ParseErrorPolicy::Drop,
            ),
            DuplicatePolicy::Reject,
            CancellationToken::new(),
        );
        assert!(dropping.push("tx-abc", "x").unwrap().is_none());
        assert_eq!(dropping.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_closes_receiver_and_rejects_pushes() {
        let cancel = CancellationToken::new();
        let (dispatcher, mut receiver, worker) = OrderedDispatcher::<&str, ()>::spawn(
            DispatcherSettings::default(),
            SequenceResolver::default(),
            DuplicatePolicy::Reject,
            cancel.clone(),
        );

        let stuck = dispatcher.push_sequenced(5, "never released").unwrap();
        cancel.cancel();
        worker.await.unwrap();

        assert!(receiver.pop().await.is_none());
        assert!(matches!(
            dispatcher.push_sequenced(0, "late"),
            Err(DispatchError::Closed)
        ));
        drop(dispatcher);
        assert!(matches!(
            stuck.wait().await,
            Err(DispatchError::Abandoned { sequence: 5 })
        ));
    }

    #[tokio::test]
    async fn test_dropping_producers_stops_worker_after_forwarding() {
        let (dispatcher, mut receiver, worker) = spawn_default::<()>();

        dispatcher.push_sequenced(0, "a").unwrap();
        dispatcher.push_sequenced(1, "b").unwrap();
        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(receiver.pop().await.unwrap().sequence, 0);
        assert_eq!(receiver.pop().await.unwrap().sequence, 1);
        assert!(receiver.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_small_signal_queue_never_blocks_producers() {
        let settings = DispatcherSettings {
            queue_capacity: 1000,
            signal_capacity: 1,
            high_water_mark: 10,
        };
        let (dispatcher, mut receiver, _worker) = OrderedDispatcher::<u64, ()>::spawn(
            settings,
            SequenceResolver::default(),
            DuplicatePolicy::Reject,
            CancellationToken::new(),
        );

        for seq in (0..200).rev() {
            dispatcher.push_sequenced(seq, seq).unwrap();
        }

        for expected in 0..200 {
            let item = receiver.pop().await.unwrap();
            assert_eq!(item.payload, expected);
        }
    }
}
