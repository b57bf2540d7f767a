//! Timeline reconstruction.
//!
//! Folds a decoded frame sequence into an ordered list of labeled,
//! point-in-time intervals. The hardware reports cycle deltas, not
//! absolute timestamps, so a running counter accumulates them back into
//! a timeline.

use crate::frames::{EventLabel, Frame};

/// Timestamp distance covered by one Sync frame.
///
/// The trace unit emits a Sync marker each time its internal cycle counter
/// wraps; the counter spans 18 bits.
pub const SYNC_TIMESTAMP_SPAN: u64 = 0x3FFFF;

/// One reconstructed occurrence of a set of events.
///
/// Start and end are equal: intervals are point emissions, stretched only
/// by repeat expansion into consecutive single-tick occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineInterval {
    /// Events active at this instant.
    pub labels: Vec<EventLabel>,
    /// Timestamp of the occurrence.
    pub start: u64,
    /// Equal to `start`.
    pub end: u64,
}

impl TimelineInterval {
    fn at(labels: Vec<EventLabel>, ts: u64) -> Self {
        Self {
            labels,
            start: ts,
            end: ts,
        }
    }
}

/// Fold a frame sequence into its timeline.
///
/// The running timestamp starts at 0. Event frames advance it by their
/// cycle delta plus one and emit an interval; repeat frames re-emit the
/// previous interval's label set once per tick; Sync advances the
/// timestamp by [`SYNC_TIMESTAMP_SPAN`] without emitting. Start, Stop,
/// Filler and Multiple2 frames leave both the timeline and the timestamp
/// untouched.
pub fn construct_timeline(frames: &[Frame]) -> Vec<TimelineInterval> {
    let mut timeline = Vec::new();
    let mut ts: u64 = 0;

    for frame in frames {
        match frame {
            Frame::Single0 { event, cycles }
            | Frame::Single1 { event, cycles }
            | Frame::Single2 { event, cycles } => {
                ts += u64::from(*cycles) + 1;
                timeline.push(TimelineInterval::at(vec![event.clone()], ts));
            }
            Frame::Multiple0 { events, cycles } | Frame::Multiple1 { events, cycles } => {
                ts += u64::from(*cycles) + 1;
                timeline.push(TimelineInterval::at(events.clone(), ts));
            }
            Frame::Repeat0 { repeats } | Frame::Repeat1 { repeats } => {
                // A repeat with nothing before it has nothing to repeat.
                if let Some(last) = timeline.last() {
                    let labels = last.labels.clone();
                    for _ in 0..*repeats {
                        ts += 1;
                        timeline.push(TimelineInterval::at(labels.clone(), ts));
                    }
                }
            }
            Frame::Sync => ts += SYNC_TIMESTAMP_SPAN,
            Frame::Start { .. }
            | Frame::Stop { .. }
            | Frame::Filler
            | Frame::Multiple2 { .. } => {}
        }
    }

    timeline
}

/// Drop the trailing run of pure stall intervals.
///
/// Captures keep recording after the traced region finishes, which leaves
/// a tail of intervals whose only label is the stall indicator. Those are
/// idle padding, not signal. Idempotent: trimming a trimmed timeline is a
/// no-op.
pub fn trim_trailing_stalls(timeline: &mut Vec<TimelineInterval>, stall_label: &str) {
    while timeline
        .last()
        .is_some_and(|interval| is_pure_stall(interval, stall_label))
    {
        timeline.pop();
    }
}

fn is_pure_stall(interval: &TimelineInterval, stall_label: &str) -> bool {
    matches!(
        interval.labels.as_slice(),
        [EventLabel::Named(name)] if name == stall_label
    )
}
