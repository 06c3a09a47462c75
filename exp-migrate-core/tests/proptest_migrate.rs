//! Property-based tests for decoding, normalization and artifact transfer.

use proptest::prelude::*;

use exp_migrate_core::config::EventStreamConfig;
use exp_migrate_core::event_stream::proto::Event;
use exp_migrate_core::event_stream::{EventStreamDecoder, RecordReader, frame_record};
use exp_migrate_core::text_log::LogNormalizer;
use exp_migrate_core::transfer::{TransferOutcome, copy_artifact};
use prost::Message;
use std::io::Cursor;
use std::path::Path;

fn encode(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .flat_map(|e| frame_record(&e.encode_to_vec()))
        .collect()
}

// --- Record framing properties ---

proptest! {
    #[test]
    fn framed_payloads_are_read_back_in_order(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16),
    ) {
        let bytes: Vec<u8> = payloads.iter().flat_map(|p| frame_record(p)).collect();
        let read: Vec<Vec<u8>> = RecordReader::new(Cursor::new(bytes))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(read, payloads);
    }

    #[test]
    fn truncated_stream_never_panics(
        payload in prop::collection::vec(any::<u8>(), 1..64),
        cut in 1usize..16,
    ) {
        let mut bytes = frame_record(&payload);
        let keep = bytes.len().saturating_sub(cut);
        bytes.truncate(keep);
        let results: Vec<_> = RecordReader::new(Cursor::new(bytes)).collect();
        prop_assert!(results.len() <= 1);
        prop_assert!(results.iter().all(|r| r.is_err()));
    }
}

// --- Decoder properties ---

proptest! {
    #[test]
    fn dominant_tag_rows_fall_on_period(
        steps in prop::collection::vec(-5000i64..50_000, 1..200),
    ) {
        let events: Vec<Event> = steps
            .iter()
            .map(|s| Event::scalars(1_514_108_000.0, *s, &[("train/loss", 0.25)]))
            .collect();
        let config = EventStreamConfig::default();
        let period = config.subsample_every;
        let log = EventStreamDecoder::new(config)
            .decode_reader(Cursor::new(encode(&events)), Path::new("events.out.tfevents.0"))
            .unwrap();

        let expected = steps.iter().filter(|s| s.rem_euclid(period) == 0).count();
        prop_assert_eq!(log.rows.len(), expected);
        prop_assert!(log.rows.iter().all(|r| r.step.rem_euclid(period) == 0));
    }

    #[test]
    fn other_tags_are_kept_in_order(
        steps in prop::collection::vec(0i64..10_000, 1..100),
    ) {
        let events: Vec<Event> = steps
            .iter()
            .map(|s| Event::scalars(1_514_108_000.0, *s, &[("val/accuracy", 0.5)]))
            .collect();
        let log = EventStreamDecoder::new(EventStreamConfig::default())
            .decode_reader(Cursor::new(encode(&events)), Path::new("events.out.tfevents.0"))
            .unwrap();
        let read: Vec<i64> = log.rows.iter().map(|r| r.step).collect();
        prop_assert_eq!(read, steps);
    }

    #[test]
    fn record_cap_bounds_reading(
        count in 0usize..60,
        limit in 1usize..40,
    ) {
        let events: Vec<Event> = (0..count)
            .map(|i| Event::scalars(1_514_108_000.0, i as i64, &[("val/accuracy", 0.5)]))
            .collect();
        let config = EventStreamConfig {
            record_limit: limit,
            ..EventStreamConfig::default()
        };
        let log = EventStreamDecoder::new(config)
            .decode_reader(Cursor::new(encode(&events)), Path::new("events.out.tfevents.0"))
            .unwrap();
        prop_assert_eq!(log.records_read, count.min(limit));
        prop_assert_eq!(log.capped, count > limit);
    }
}

// --- Normalizer properties ---

proptest! {
    #[test]
    fn normalized_log_ends_at_marker(
        before in 0usize..30,
        after in 0usize..30,
        epoch in 1u32..500,
    ) {
        let mut lines: Vec<String> = (0..before)
            .map(|i| format!("2018-04-01 - trainer - INFO - Train Epoch: {i}"))
            .collect();
        lines.push(format!(
            "2018-04-01 - trainer - INFO - Saving checkpoint: checkpoint-epoch{epoch}.pth ..."
        ));
        lines.extend((0..after).map(|i| format!("2018-04-02 - trainer - INFO - overrun {i}")));
        let config = "{\n  \"name\": \"exp\"\n}";

        let out = LogNormalizer::default()
            .normalize(&lines.join("\n"), config, epoch, "2018-04-01_00-00-00")
            .unwrap();

        prop_assert_eq!(out.len(), 2 + 3 + before + 1);
        prop_assert_eq!(&out[5..], &lines[..=before]);
        prop_assert!(!out.iter().any(|l| l.contains("overrun")));
    }
}

// --- Transfer properties ---

proptest! {
    #[test]
    fn existing_destination_is_never_overwritten_without_refresh(
        original in prop::collection::vec(any::<u8>(), 0..256),
        replacement in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src.pth");
        let dest = dir.path().join("out/model_best.pth");
        std::fs::write(&src, &original).unwrap();
        copy_artifact("checkpoint", &src, &dest, false).unwrap();

        std::fs::write(&src, &replacement).unwrap();
        let outcome = copy_artifact("checkpoint", &src, &dest, false).unwrap();
        prop_assert_eq!(outcome, TransferOutcome::Skipped);
        prop_assert_eq!(std::fs::read(&dest).unwrap(), original);

        let outcome = copy_artifact("checkpoint", &src, &dest, true).unwrap();
        prop_assert!(outcome.copied());
        prop_assert_eq!(std::fs::read(&dest).unwrap(), replacement);
    }
}
