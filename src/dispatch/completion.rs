use crate::dispatch::DispatchError;
use tokio::sync::oneshot;
use tracing::debug;

/// Create the two halves of an item's completion rendezvous.
pub(crate) fn completion_pair<R>(sequence: u64) -> (Completion<R>, Ticket<R>) {
    let (tx, rx) = oneshot::channel();
    (Completion { sequence, tx }, Ticket { sequence, rx })
}

/// Held by whoever processes a dispatched item; fires exactly once.
#[derive(Debug)]
pub struct Completion<R> {
    sequence: u64,
    tx: oneshot::Sender<R>,
}

impl<R> Completion<R> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Hand the processing result back to the submitter.
    pub fn complete(self, response: R) {
        if self.tx.send(response).is_err() {
            debug!(sequence = self.sequence, "Submitter stopped waiting for completion");
        }
    }
}

impl Completion<()> {
    pub fn done(self) {
        self.complete(())
    }
}

/// Held by the submitter of an item; resolves once the item is processed.
#[derive(Debug)]
pub struct Ticket<R> {
    sequence: u64,
    rx: oneshot::Receiver<R>,
}

impl<R> Ticket<R> {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wait for the processor to complete the item.
    ///
    /// Fails with `Abandoned` if the item was dropped without being completed,
    /// for example because the dispatcher shut down or a duplicate replaced it.
    pub async fn wait(self) -> Result<R, DispatchError> {
        let sequence = self.sequence;
        self.rx
            .await
            .map_err(|_| DispatchError::Abandoned { sequence })
    }

    /// Blocking variant of [`Ticket::wait`] for callers outside the runtime.
    ///
    /// Panics if called from within an async context.
    pub fn blocking_wait(self) -> Result<R, DispatchError> {
        let sequence = self.sequence;
        self.rx
            .blocking_recv()
            .map_err(|_| DispatchError::Abandoned { sequence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_delivers_response() {
        let (completion, ticket) = completion_pair::<String>(4);
        assert_eq!(completion.sequence(), 4);
        assert_eq!(ticket.sequence(), 4);

        completion.complete("endorsed".to_string());
        assert_eq!(ticket.wait().await.unwrap(), "endorsed");
    }

    #[tokio::test]
    async fn test_dropped_completion_abandons_ticket() {
        let (completion, ticket) = completion_pair::<()>(9);
        drop(completion);

        let err = ticket.wait().await.unwrap_err();
        assert!(matches!(err, DispatchError::Abandoned { sequence: 9 }));
    }

    #[test]
    fn test_blocking_wait_across_threads() {
        let (completion, ticket) = completion_pair::<()>(1);

        let processor = std::thread::spawn(move || completion.done());
        ticket.blocking_wait().unwrap();
        processor.join().unwrap();
    }
}
