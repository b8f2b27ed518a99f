//! Per-source sequence tracking
//!
//! Each source gets an independent next-expected counter (starting at
//! 0) and a buffer of events that arrived ahead of it. Delivering the
//! expected event also drains its contiguous buffered successors.

use common::Event;
use rustc_hash::FxHashMap;

/// What to do with an observed event.
pub(crate) enum Observation {
    /// Deliver these events, in order.
    Deliver(Vec<Event>),
    /// The event arrived ahead of sequence and was buffered.
    Buffered,
    /// The event arrived behind sequence and must be dropped.
    Stale {
        /// Source the event came from
        source: String,
        /// Sequence number the event carried
        sequence_id: u64,
        /// Sequence number the source is waiting for
        expected: u64,
    },
}

#[derive(Default)]
struct SourceState {
    expected: u64,
    pending: FxHashMap<u64, Event>,
}

/// Sequence state across all sources.
#[derive(Default)]
pub(crate) struct SequenceTracker {
    sources: FxHashMap<String, SourceState>,
}

impl SequenceTracker {
    pub(crate) fn observe(&mut self, event: Event) -> Observation {
        let Some(sequence_id) = event.sequence_id else {
            return Observation::Deliver(vec![event]);
        };

        let state = self.sources.entry(event.source.clone()).or_default();

        if sequence_id == state.expected {
            state.expected += 1;
            let mut deliverable = vec![event];
            while let Some(buffered) = state.pending.remove(&state.expected) {
                deliverable.push(buffered);
                state.expected += 1;
            }
            Observation::Deliver(deliverable)
        } else if sequence_id > state.expected {
            state.pending.insert(sequence_id, event);
            Observation::Buffered
        } else {
            Observation::Stale { source: event.source, sequence_id, expected: state.expected }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{EventPayload, SystemEvent};

    fn event(source: &str, sequence_id: u64) -> Event {
        Event::new(EventPayload::SystemEvent(SystemEvent::HeartbeatRequest), source)
            .with_sequence(sequence_id)
    }

    fn sequences(observation: Observation) -> Vec<u64> {
        match observation {
            Observation::Deliver(events) => {
                events.into_iter().filter_map(|e| e.sequence_id).collect()
            }
            _ => panic!("expected delivery"),
        }
    }

    #[test]
    fn unsequenced_events_pass_through() {
        let mut tracker = SequenceTracker::default();
        let event =
            Event::new(EventPayload::SystemEvent(SystemEvent::HeartbeatRequest), "S");
        assert!(matches!(tracker.observe(event), Observation::Deliver(events) if events.len() == 1));
    }

    #[test]
    fn gap_buffers_until_filled() {
        let mut tracker = SequenceTracker::default();
        assert_eq!(sequences(tracker.observe(event("S", 0))), vec![0]);
        assert!(matches!(tracker.observe(event("S", 2)), Observation::Buffered));
        assert!(matches!(tracker.observe(event("S", 3)), Observation::Buffered));
        // Filling the gap releases the whole contiguous run.
        assert_eq!(sequences(tracker.observe(event("S", 1))), vec![1, 2, 3]);
    }

    #[test]
    fn stale_events_report_expected() {
        let mut tracker = SequenceTracker::default();
        tracker.observe(event("S", 0));
        match tracker.observe(event("S", 0)) {
            Observation::Stale { source, sequence_id, expected } => {
                assert_eq!(source, "S");
                assert_eq!(sequence_id, 0);
                assert_eq!(expected, 1);
            }
            _ => panic!("expected stale"),
        }
    }

    #[test]
    fn sources_do_not_interfere() {
        let mut tracker = SequenceTracker::default();
        assert_eq!(sequences(tracker.observe(event("A", 0))), vec![0]);
        assert_eq!(sequences(tracker.observe(event("B", 0))), vec![0]);
        assert!(matches!(tracker.observe(event("A", 2)), Observation::Buffered));
        assert_eq!(sequences(tracker.observe(event("B", 1))), vec![1]);
    }
}
