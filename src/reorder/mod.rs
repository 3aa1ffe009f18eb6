pub mod buffer;
pub mod lock;

pub use buffer::{DuplicatePolicy, ReorderBuffer, ReorderError, Sequenced, MAX_SEQUENCE};
pub use lock::SequenceLock;
