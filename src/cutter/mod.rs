pub mod batch;
pub mod runner;
pub mod scheduler;

pub use batch::{Batch, BatchLimits, Envelope, LimitsError, MessageSize, ScheduleOutcome};
pub use runner::{run_cutter, CutterError, CutterSettings, CutterStats};
pub use scheduler::{BatchCutter, ScheduleError};
