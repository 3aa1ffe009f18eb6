use crate::cli::input::{cancel_on_ctrl_c, open_input, require_config, EnvelopeLines};
use crate::config::parse::{load_config, ConfigError};
use crate::config::types::Config;
use crate::cutter::{run_cutter, Batch, BatchCutter, CutterError, CutterSettings, CutterStats, Envelope};
use crate::dispatch::DispatchError;
use crate::metrics::{FillDurationHistogram, MetricsError};
use crate::pipeline::{create_channel, Sender};
use crate::sequence::{RegexSequenceSource, SequenceError, SequenceResolver};
use prometheus::Registry;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("cutter error: {0}")]
    Cutter(#[from] CutterError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One output line: a cut batch
#[derive(Debug, Serialize)]
struct BatchRecord<'a> {
    channel: &'a str,
    number: u64,
    first_sequence: Option<u64>,
    last_sequence: Option<u64>,
    count: usize,
    total_bytes: u64,
    tx_ids: Vec<&'a str>,
}

impl<'a> BatchRecord<'a> {
    fn new(channel: &'a str, number: u64, batch: &'a Batch<Envelope>) -> Self {
        Self {
            channel,
            number,
            first_sequence: batch.first_sequence(),
            last_sequence: batch.last_sequence(),
            count: batch.len(),
            total_bytes: batch.total_bytes(),
            tx_ids: batch.items().iter().map(|i| i.payload.tx_id.as_str()).collect(),
        }
    }
}

#[derive(Debug)]
pub struct ReplaySummary {
    pub stats: CutterStats,
    /// Input lines that were not valid envelope JSON
    pub skipped_lines: u64,
    /// Prometheus text exposition of the fill duration histogram
    pub metrics: String,
}

pub async fn run(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    print_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config(config_path)?;
    let summary = run_from_path(&config_path, input.as_deref()).await?;

    if print_metrics {
        eprint!("{}", summary.metrics);
    }

    Ok(())
}

async fn run_from_path(config_path: &Path, input: Option<&Path>) -> Result<ReplaySummary, RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let reader = open_input(input).await?;
    let cancel = cancel_on_ctrl_c();
    replay(&config, reader, &mut std::io::stdout(), cancel).await
}

/// Order JSON-lines envelopes from `input` into batches, writing one JSON line
/// per batch to `output`.
pub async fn replay<R, W>(
    config: &Config,
    input: R,
    output: &mut W,
    cancel: CancellationToken,
) -> Result<ReplaySummary, RunError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: Write,
{
    let registry = Registry::new();
    let histogram = FillDurationHistogram::new(&registry)?;

    let resolver = SequenceResolver::new(
        Box::new(RegexSequenceSource::new(&config.sequence.pattern)?),
        config.sequence.on_parse_error,
    );
    let cutter = BatchCutter::new(
        config.channel_id.clone(),
        Arc::new(histogram.clone()),
        resolver,
        config.sequence.on_duplicate,
    );

    let (envelope_tx, envelope_rx) = create_channel(config.orderer.channel_capacity);
    let (batch_tx, mut batch_rx) = create_channel(config.orderer.channel_capacity);

    let cutter_handle = tokio::spawn(run_cutter(
        envelope_rx,
        batch_tx,
        cutter,
        CutterSettings::from(&config.orderer),
        cancel.clone(),
    ));
    let reader_handle = tokio::spawn(read_envelopes(input, envelope_tx, cancel));

    let mut number = 0;
    while let Some(batch) = batch_rx.recv().await {
        let line = serde_json::to_string(&BatchRecord::new(&config.channel_id, number, &batch))?;
        writeln!(output, "{}", line)?;
        number += 1;
    }
    output.flush()?;

    let skipped_lines = reader_handle.await??;
    let stats = cutter_handle.await??;

    info!(
        channel = %config.channel_id,
        envelopes = stats.envelopes,
        batches = stats.batches,
        rejected = stats.rejected,
        stranded = stats.stranded,
        skipped_lines,
        "Replay finished"
    );

    Ok(ReplaySummary {
        stats,
        skipped_lines,
        metrics: histogram.encode_text()?,
    })
}

/// Feed parsed envelopes to the cutter. Returns the number of lines skipped
/// as malformed.
async fn read_envelopes<R>(
    input: R,
    output: Sender<Envelope>,
    cancel: CancellationToken,
) -> Result<u64, RunError>
where
    R: AsyncBufRead + Unpin,
{
    let mut envelopes = EnvelopeLines::new(input);

    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = envelopes.next_envelope() => envelope?,
        };
        let Some(envelope) = envelope else { break };

        if output.send(envelope).await.is_err() {
            // Cutter has stopped
            break;
        }
    }

    Ok(envelopes.skipped())
}
