use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use txorder::cli::run::replay;
use txorder::config::parse_config;
use txorder::cutter::{run_cutter, Batch, BatchCutter, BatchLimits, CutterSettings, Envelope, MessageSize};
use txorder::metrics::FillDurationHistogram;
use txorder::reorder::DuplicatePolicy;
use txorder::sequence::SequenceResolver;

const COUNT: u64 = 300;

fn envelope(sequence: u64) -> Envelope {
    // Sizes cycle through 7..=56 bytes
    let size = 7 + (sequence * 13 % 50) as usize;
    Envelope::new(sequence.to_string(), vec![b'p'; size - 2], vec![b's'; 2])
}

#[tokio::test]
async fn test_shuffled_stream_is_cut_completely_within_limits() {
    let registry = Registry::new();
    let histogram = FillDurationHistogram::new(&registry).unwrap();
    let cutter = BatchCutter::new(
        "it-channel",
        Arc::new(histogram.clone()),
        SequenceResolver::default(),
        DuplicatePolicy::Reject,
    );

    let limits = BatchLimits::new(200, 6);
    let settings = CutterSettings {
        limits,
        batch_timeout: Duration::from_secs(60),
    };

    let (input_tx, input_rx) = mpsc::channel(64);
    let (output_tx, mut output_rx) = mpsc::channel(64);
    let handle = tokio::spawn(run_cutter(
        input_rx,
        output_tx,
        cutter,
        settings,
        CancellationToken::new(),
    ));

    tokio::spawn(async move {
        // 7 is coprime with COUNT, so this visits every sequence once
        for i in 0..COUNT {
            input_tx.send(envelope((i * 7) % COUNT)).await.unwrap();
        }
    });

    let mut batches = Vec::new();
    while let Some(batch) = output_rx.recv().await {
        batches.push(batch);
    }
    let stats = handle.await.unwrap().unwrap();

    assert_eq!(stats.envelopes, COUNT);
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.stranded, 0);
    assert_eq!(stats.batches, batches.len() as u64);

    let mut expected = 0;
    for batch in &batches {
        assert!(!batch.is_empty());
        assert!(batch.len() <= limits.max_message_count as usize);
        if batch.len() > 1 {
            assert!(batch.total_bytes() <= u64::from(limits.preferred_max_bytes));
        }
        let recomputed: u64 = batch.items().iter().map(|i| i.payload.size_bytes()).sum();
        assert_eq!(batch.total_bytes(), recomputed);
        for item in batch.items() {
            assert_eq!(item.sequence, expected);
            assert_eq!(item.payload.tx_id, expected.to_string());
            expected += 1;
        }
    }
    assert_eq!(expected, COUNT);

    assert_eq!(histogram.sample_count("it-channel"), batches.len() as u64);

    let tx_ids: Vec<String> = batches
        .into_iter()
        .flat_map(Batch::into_items)
        .map(|item| item.payload.tx_id)
        .collect();
    assert_eq!(tx_ids.first().map(String::as_str), Some("0"));
    assert_eq!(tx_ids.len() as u64, COUNT);
}

#[tokio::test]
async fn test_replay_writes_one_line_per_batch() {
    let config = parse_config(
        r#"
channel_id: replay
orderer:
  batch_size:
    preferred_max_bytes: 1000
    max_message_count: 2
  batch_timeout: 1m
"#,
    )
    .unwrap();

    let input = concat!(
        "{\"tx_id\":\"2\",\"payload\":\"ccc\"}\n",
        "not json\n",
        "\n",
        "{\"tx_id\":\"0\",\"payload\":\"a\",\"signature\":\"s\"}\n",
        "{\"tx_id\":\"1\",\"payload\":\"bb\"}\n",
        "{\"tx_id\":\"oops\",\"payload\":\"x\"}\n",
    );

    let mut output = Vec::new();
    let summary = replay(
        &config,
        BufReader::new(input.as_bytes()),
        &mut output,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.skipped_lines, 1);
    assert_eq!(summary.stats.envelopes, 4);
    assert_eq!(summary.stats.rejected, 1);
    assert_eq!(summary.stats.batches, 2);
    assert!(summary
        .metrics
        .contains("blockcutter_block_fill_duration_count{channel=\"replay\"} 2"));

    let lines: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["number"], 0);
    assert_eq!(lines[0]["channel"], "replay");
    assert_eq!(lines[0]["first_sequence"], 0);
    assert_eq!(lines[0]["last_sequence"], 1);
    assert_eq!(lines[0]["count"], 2);
    assert_eq!(lines[0]["total_bytes"], 4);
    assert_eq!(lines[0]["tx_ids"], serde_json::json!(["0", "1"]));

    // Flushed when the input ends
    assert_eq!(lines[1]["number"], 1);
    assert_eq!(lines[1]["tx_ids"], serde_json::json!(["2"]));
    assert_eq!(lines[1]["total_bytes"], 3);
}
