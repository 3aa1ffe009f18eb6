use crate::config::types::OrdererConfig;
use crate::cutter::batch::{Batch, BatchLimits, Envelope};
use crate::cutter::scheduler::BatchCutter;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CutterError {
    #[error("channel send error")]
    ChannelSend,
}

/// Settings for the async cutter loop
#[derive(Debug, Clone, Copy)]
pub struct CutterSettings {
    pub limits: BatchLimits,
    /// How long a forming batch may wait before it is cut regardless of size.
    pub batch_timeout: Duration,
}

impl Default for CutterSettings {
    fn default() -> Self {
        Self {
            limits: BatchLimits::default(),
            batch_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&OrdererConfig> for CutterSettings {
    fn from(config: &OrdererConfig) -> Self {
        Self {
            limits: config.batch_size,
            batch_timeout: config.batch_timeout,
        }
    }
}

/// Totals reported when the cutter loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CutterStats {
    pub envelopes: u64,
    pub batches: u64,
    /// Envelopes refused by the cutter (bad id, duplicate, already released).
    pub rejected: u64,
    /// Items still buffered at exit, blocked behind a gap or never flushed.
    pub stranded: usize,
}

/// Run a batch cutter over a stream of envelopes.
///
/// Every batch the cutter produces is sent to `output` in order. A forming
/// batch that has waited `batch_timeout` is cut even if neither limit has been
/// reached. When `input` closes, the forming batch is flushed and the loop
/// returns; cancelling `cancel` returns immediately without flushing.
pub async fn run_cutter(
    mut input: mpsc::Receiver<Envelope>,
    output: mpsc::Sender<Batch<Envelope>>,
    mut cutter: BatchCutter<Envelope>,
    settings: CutterSettings,
    cancel: CancellationToken,
) -> Result<CutterStats, CutterError> {
    let mut stats = CutterStats::default();
    let mut input_closed = false;

    info!(
        channel = %cutter.channel_id(),
        preferred_max_bytes = settings.limits.preferred_max_bytes,
        max_message_count = settings.limits.max_message_count,
        batch_timeout_ms = settings.batch_timeout.as_millis() as u64,
        "Starting batch cutter"
    );

    loop {
        let deadline = cutter
            .forming_started_at()
            .map(|started| Instant::from_std(started) + settings.batch_timeout);

        tokio::select! {
            _ = cancel.cancelled() => {
                info!(channel = %cutter.channel_id(), "Batch cutter cancelled");
                break;
            }

            envelope = input.recv() => {
                let Some(envelope) = envelope else {
                    input_closed = true;
                    break;
                };
                stats.envelopes += 1;

                let tx_id = envelope.tx_id.clone();
                match cutter.schedule(envelope, &tx_id, &settings.limits) {
                    Ok(outcome) => {
                        for batch in outcome.batches {
                            send_batch(&output, batch, &mut stats).await?;
                        }
                    }
                    Err(e) => {
                        stats.rejected += 1;
                        warn!(channel = %cutter.channel_id(), tx_id = %tx_id, error = %e, "Rejected envelope");
                    }
                }
            }

            _ = sleep_until(deadline) => {
                if let Some(batch) = cutter.flush() {
                    debug!(channel = %cutter.channel_id(), items = batch.len(), "Batch timer expired");
                    send_batch(&output, batch, &mut stats).await?;
                }
            }
        }
    }

    if input_closed {
        if let Some(batch) = cutter.flush() {
            send_batch(&output, batch, &mut stats).await?;
        }
    }

    stats.stranded = cutter.gap_blocked() + cutter.forming_len();
    if stats.stranded > 0 {
        warn!(
            channel = %cutter.channel_id(),
            stranded = stats.stranded,
            next_sequence = cutter.next_sequence(),
            "Batch cutter stopped with items still buffered"
        );
    }

    info!(
        channel = %cutter.channel_id(),
        envelopes = stats.envelopes,
        batches = stats.batches,
        rejected = stats.rejected,
        "Batch cutter finished"
    );

    Ok(stats)
}

async fn send_batch(
    output: &mpsc::Sender<Batch<Envelope>>,
    batch: Batch<Envelope>,
    stats: &mut CutterStats,
) -> Result<(), CutterError> {
    output
        .send(batch)
        .await
        .map_err(|_| CutterError::ChannelSend)?;
    stats.batches += 1;
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
