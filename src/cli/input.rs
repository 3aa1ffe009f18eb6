use crate::config::default_config_paths;
use crate::cutter::Envelope;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One input line: a transaction submitted for ordering
#[derive(Debug, Deserialize)]
struct EnvelopeRecord {
    tx_id: String,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    signature: String,
}

impl From<EnvelopeRecord> for Envelope {
    fn from(record: EnvelopeRecord) -> Self {
        Envelope::new(
            record.tx_id,
            record.payload.into_bytes(),
            record.signature.into_bytes(),
        )
    }
}

/// JSON-lines envelope reader. Blank lines are ignored; malformed lines are
/// logged, counted and skipped.
pub(crate) struct EnvelopeLines<R> {
    lines: Lines<R>,
    line_number: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> EnvelopeLines<R> {
    pub(crate) fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            line_number: 0,
            skipped: 0,
        }
    }

    /// Next well-formed envelope, or `None` at end of input.
    ///
    /// Cancel safe: the only await point is reading the next line.
    pub(crate) async fn next_envelope(&mut self) -> std::io::Result<Option<Envelope>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<EnvelopeRecord>(&line) {
                Ok(record) => return Ok(Some(record.into())),
                Err(e) => {
                    warn!(line = self.line_number, error = %e, "Skipping malformed envelope line");
                    self.skipped += 1;
                }
            }
        }
        Ok(None)
    }

    pub(crate) fn skipped(&self) -> u64 {
        self.skipped
    }
}

pub(crate) type InputReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Open `--input`, or stdin when no file was given.
pub(crate) async fn open_input(input: Option<&Path>) -> std::io::Result<InputReader> {
    match input {
        Some(path) => {
            info!(input = %path.display(), "Reading envelopes from file");
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            info!("Reading envelopes from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

pub(crate) fn require_config(
    config_path: Option<PathBuf>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    config_path.ok_or_else(|| {
        let searched: Vec<String> = default_config_paths()
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        format!(
            "config not found (searched {}); use --config <path> or run 'txorder config init'",
            searched.join(", ")
        )
        .into()
    })
}

/// Token cancelled on Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, stopping");
            shutdown.cancel();
        }
    });
    cancel
}
