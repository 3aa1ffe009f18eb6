pub mod completion;
pub mod dispatcher;

use crate::reorder::ReorderError;
use crate::sequence::SequenceError;
use thiserror::Error;

pub use completion::{Completion, Ticket};
pub use dispatcher::{Dispatched, DispatcherSettings, OrderedDispatcher, OrderedReceiver};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("reorder error: {0}")]
    Reorder(#[from] ReorderError),

    #[error("dispatcher is shut down")]
    Closed,

    #[error("item {sequence} was dropped before it was completed")]
    Abandoned { sequence: u64 },
}
