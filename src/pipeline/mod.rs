pub mod backpressure;
pub mod channel;

pub use backpressure::HighWaterMark;
pub use channel::{create_channel, Receiver, Sender};
