use crate::cutter::BatchLimits;
use crate::reorder::DuplicatePolicy;
use crate::sequence::{ParseErrorPolicy, DEFAULT_SEQUENCE_PATTERN};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub channel_id: String,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub orderer: OrdererConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Regex with a named capture group 'seq' applied to transaction ids
    #[serde(default = "default_sequence_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub on_parse_error: ParseErrorPolicy,
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

fn default_sequence_pattern() -> String {
    DEFAULT_SEQUENCE_PATTERN.to_string()
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            pattern: default_sequence_pattern(),
            on_parse_error: ParseErrorPolicy::default(),
            on_duplicate: DuplicatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdererConfig {
    #[serde(default)]
    pub batch_size: BatchLimits,
    #[serde(with = "humantime_serde", default = "default_batch_timeout")]
    pub batch_timeout: Duration,
    /// Buffer size of the envelope and batch channels around the cutter
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_channel_capacity() -> usize {
    1000
}

impl Default for OrdererConfig {
    fn default() -> Self {
        Self {
            batch_size: BatchLimits::default(),
            batch_timeout: default_batch_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub signal_capacity: usize,
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
}

fn default_queue_capacity() -> usize {
    100_000
}

fn default_high_water_mark() -> usize {
    50_000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            signal_capacity: default_queue_capacity(),
            high_water_mark: default_high_water_mark(),
        }
    }
}
