//! Property tests for result coalescing
//!
//! For any sequence of worker messages absorbed between two drains:
//! - The drained status is the last non-cleared status
//! - The drained events are the concatenation of every batch, in order
//! - A second drain yields nothing

use poredispatch::WorkerMessage;
use poredispatch::services::ResultAccumulator;
use proptest::prelude::*;

fn message_strategy() -> impl Strategy<Value = WorkerMessage<u16>> {
    prop_oneof![
        "[a-z ]{0,12}".prop_map(WorkerMessage::StatusUpdate),
        prop::collection::vec(any::<u16>(), 0..8).prop_map(WorkerMessage::ResultBatch),
    ]
}

proptest! {
    #[test]
    fn drain_coalesces_messages(messages in prop::collection::vec(message_strategy(), 0..40)) {
        let mut expected_status: Option<String> = None;
        let mut expected_events: Vec<u16> = Vec::new();
        for message in &messages {
            match message {
                WorkerMessage::StatusUpdate(text) if text.is_empty() => expected_status = None,
                WorkerMessage::StatusUpdate(text) => expected_status = Some(text.clone()),
                WorkerMessage::ResultBatch(items) => expected_events.extend(items),
            }
        }

        let mut accumulator = ResultAccumulator::new();
        for message in messages {
            accumulator.absorb(message);
        }
        prop_assert_eq!(accumulator.pending_event_count(), expected_events.len());

        match accumulator.drain() {
            Some(flush) => {
                prop_assert_eq!(flush.status_text, expected_status);
                prop_assert_eq!(flush.events.unwrap_or_default(), expected_events);
            }
            None => {
                prop_assert!(expected_status.is_none());
                prop_assert!(expected_events.is_empty());
            }
        }

        prop_assert!(accumulator.is_empty());
        prop_assert!(accumulator.drain().is_none());
    }

    #[test]
    fn drain_never_yields_empty_event_vec(batches in prop::collection::vec(prop::collection::vec(any::<u16>(), 0..4), 1..10)) {
        let mut accumulator = ResultAccumulator::new();
        for batch in batches {
            accumulator.absorb(WorkerMessage::ResultBatch(batch));
        }

        if let Some(flush) = accumulator.drain() {
            prop_assert!(flush.events.is_none_or(|events| !events.is_empty()));
        }
    }
}
