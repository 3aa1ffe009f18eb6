pub mod cli;
pub mod config;
pub mod cutter;
pub mod dispatch;
pub mod metrics;
pub mod pipeline;
pub mod reorder;
pub mod sequence;
