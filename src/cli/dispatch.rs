use crate::cli::input::{cancel_on_ctrl_c, open_input, require_config, EnvelopeLines};
use crate::cli::run::RunError;
use crate::config::parse::load_config;
use crate::config::types::Config;
use crate::cutter::{Envelope, MessageSize};
use crate::dispatch::{DispatchError, DispatcherSettings, OrderedDispatcher};
use crate::sequence::{RegexSequenceSource, SequenceResolver};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One output line: an envelope handed to the consumer
#[derive(Debug, Serialize)]
struct DispatchRecord<'a> {
    position: u64,
    sequence: u64,
    tx_id: &'a str,
    bytes: u64,
}

/// Counts reported when a dispatch replay finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Envelopes accepted by the dispatcher.
    pub submitted: u64,
    /// Envelopes refused on push (bad id, duplicate, already released).
    pub rejected: u64,
    /// Envelopes whose malformed id the drop policy discarded.
    pub dropped: u64,
    /// Envelopes the consumer received and completed.
    pub dispatched: u64,
    /// Submitters that received their response.
    pub acknowledged: u64,
    /// Submitters whose envelope was never completed, e.g. stuck behind a gap.
    pub abandoned: u64,
    /// Input lines that were not valid envelope JSON.
    pub skipped_lines: u64,
}

pub async fn run(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config(config_path)?;
    dispatch_from_path(&config_path, input.as_deref()).await?;
    Ok(())
}

async fn dispatch_from_path(
    config_path: &Path,
    input: Option<&Path>,
) -> Result<DispatchSummary, RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let reader = open_input(input).await?;
    let cancel = cancel_on_ctrl_c();
    replay(&config, reader, &mut std::io::stdout(), cancel).await
}

/// Release JSON-lines envelopes from `input` one at a time in sequence order,
/// writing one JSON line per envelope to `output`.
///
/// Each submitter waits on its ticket; the consumer answers with the
/// envelope's position in the output.
pub async fn replay<R, W>(
    config: &Config,
    input: R,
    output: &mut W,
    cancel: CancellationToken,
) -> Result<DispatchSummary, RunError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: Write,
{
    let resolver = SequenceResolver::new(
        Box::new(RegexSequenceSource::new(&config.sequence.pattern)?),
        config.sequence.on_parse_error,
    );
    let settings = DispatcherSettings::from(&config.dispatcher);
    info!(
        queue_capacity = settings.queue_capacity,
        signal_capacity = settings.signal_capacity,
        high_water_mark = settings.high_water_mark,
        "Starting ordered dispatcher"
    );

    let (dispatcher, mut receiver, worker) = OrderedDispatcher::<Envelope, u64>::spawn(
        settings,
        resolver,
        config.sequence.on_duplicate,
        cancel.clone(),
    );
    let producer = tokio::spawn(submit_envelopes(input, dispatcher, cancel));

    let mut dispatched = 0;
    while let Some(item) = receiver.pop().await {
        let (sequence, envelope, completion) = item.into_parts();
        let record = DispatchRecord {
            position: dispatched,
            sequence,
            tx_id: &envelope.tx_id,
            bytes: envelope.size_bytes(),
        };
        writeln!(output, "{}", serde_json::to_string(&record)?)?;
        completion.complete(dispatched);
        dispatched += 1;
    }
    output.flush()?;

    worker.await?;
    let mut summary = producer.await??;
    summary.dispatched = dispatched;

    if summary.abandoned > 0 {
        warn!(
            abandoned = summary.abandoned,
            "Dispatcher stopped with envelopes still waiting for earlier sequences"
        );
    }
    info!(
        submitted = summary.submitted,
        dispatched = summary.dispatched,
        acknowledged = summary.acknowledged,
        rejected = summary.rejected,
        dropped = summary.dropped,
        skipped_lines = summary.skipped_lines,
        "Dispatch finished"
    );

    Ok(summary)
}

/// Push every envelope, then wait for each submitter's response.
async fn submit_envelopes<R>(
    input: R,
    dispatcher: OrderedDispatcher<Envelope, u64>,
    cancel: CancellationToken,
) -> Result<DispatchSummary, RunError>
where
    R: AsyncBufRead + Unpin,
{
    let mut envelopes = EnvelopeLines::new(input);
    let mut summary = DispatchSummary::default();
    let mut tickets = Vec::new();

    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = envelopes.next_envelope() => envelope?,
        };
        let Some(envelope) = envelope else { break };

        let tx_id = envelope.tx_id.clone();
        match dispatcher.push(&tx_id, envelope) {
            Ok(Some(ticket)) => {
                summary.submitted += 1;
                tickets.push(ticket);
            }
            Ok(None) => summary.dropped += 1,
            Err(DispatchError::Closed) => break,
            Err(e) => {
                warn!(tx_id = %tx_id, error = %e, "Rejected envelope");
                summary.rejected += 1;
            }
        }
    }
    summary.skipped_lines = envelopes.skipped();

    // Last producer handle: the worker stops once the ready prefix is forwarded
    drop(dispatcher);

    for ticket in tickets {
        match ticket.wait().await {
            Ok(_) => summary.acknowledged += 1,
            Err(DispatchError::Abandoned { sequence }) => {
                debug!(sequence, "Envelope abandoned before dispatch");
                summary.abandoned += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(summary)
}
