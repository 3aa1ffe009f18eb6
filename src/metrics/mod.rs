//! Block fill duration metric.
//!
//! The batch cutter reports, for every batch it cuts, how long the batch spent
//! forming. The recorder is injected into each cutter; the Prometheus-backed
//! implementation labels observations with the cutter's channel id.

use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use std::time::Duration;
use thiserror::Error;

pub const BLOCK_FILL_DURATION_METRIC: &str = "blockcutter_block_fill_duration";

/// Buckets in seconds, from sub-millisecond fills up to long batch timeouts.
pub const BLOCK_FILL_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0,
];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Write-only sink for block fill durations.
pub trait FillDurationRecorder: Send + Sync {
    fn observe(&self, channel: &str, elapsed: Duration);
}

/// Recorder that discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl FillDurationRecorder for NoopRecorder {
    fn observe(&self, _channel: &str, _elapsed: Duration) {}
}

/// Histogram of block fill durations, labelled by channel.
#[derive(Clone)]
pub struct FillDurationHistogram {
    registry: Registry,
    fill_duration: HistogramVec,
}

impl FillDurationHistogram {
    /// Creates the histogram and registers it with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is already registered.
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let fill_duration = HistogramVec::new(
            HistogramOpts::new(
                BLOCK_FILL_DURATION_METRIC,
                "The time from first transaction enqueuing to the block being cut in seconds.",
            )
            .buckets(BLOCK_FILL_BUCKETS.to_vec()),
            &["channel"],
        )?;
        registry.register(Box::new(fill_duration.clone()))?;

        Ok(Self {
            registry: registry.clone(),
            fill_duration,
        })
    }

    /// Number of observations recorded for `channel`.
    pub fn sample_count(&self, channel: &str) -> u64 {
        self.fill_duration
            .with_label_values(&[channel])
            .get_sample_count()
    }

    /// Renders every metric in the registry in the Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

impl FillDurationRecorder for FillDurationHistogram {
    fn observe(&self, channel: &str, elapsed: Duration) {
        self.fill_duration
            .with_label_values(&[channel])
            .observe(elapsed.as_secs_f64());
    }
}

impl std::fmt::Debug for FillDurationHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillDurationHistogram").finish_non_exhaustive()
    }
}
