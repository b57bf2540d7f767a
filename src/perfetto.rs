//! Trace-event record emission.
//!
//! Maps each source identity and its timeline onto records in the chrome
//! trace-event format: metadata records naming processes and threads,
//! then matched begin/end pairs per event occurrence. The record list
//! serializes directly as a trace-event JSON array that Perfetto and
//! chrome://tracing consume.
//!
//! Each source identity becomes one "process" (pid derived from the
//! identity), and each configured event label becomes one "thread" within
//! it (tid = the label's slot index).

use serde::Serialize;
use thiserror::Error;

use crate::buffers::{SourceIdentity, TraceBuffers};
use crate::frames::{decode_frames, EventLabel};
use crate::timeline::{construct_timeline, trim_trailing_stalls, TimelineInterval};

/// Errors produced while emitting trace-event records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// An interval carries an event with no position in the supplied label
    /// list, so no thread id can be assigned. The label list passed to the
    /// decode must cover every slot the hardware was configured to trace.
    #[error("event {label} is not in the supplied label list; cannot assign a thread id")]
    UnknownLabel {
        /// The unresolvable event identifier.
        label: EventLabel,
    },
}

/// Trace-event phase tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Metadata record (process/thread naming).
    #[serde(rename = "M")]
    Metadata,
    /// Duration begin.
    #[serde(rename = "B")]
    Begin,
    /// Duration end.
    #[serde(rename = "E")]
    End,
}

/// Argument map attached to every record.
///
/// Metadata records carry the process/thread name here; begin/end records
/// carry an empty map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventArgs {
    /// Name payload for metadata records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One chrome trace-event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    /// Record name ("process_name"/"thread_name" for metadata, the event
    /// label for begin/end records).
    pub name: String,
    /// Phase tag.
    pub ph: Phase,
    /// Process id derived from the source identity.
    pub pid: u32,
    /// Thread id (the event label's slot index); absent on process
    /// metadata records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<u32>,
    /// Timestamp; absent on metadata records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
    /// Argument map.
    pub args: EventArgs,
}

/// Process-metadata record naming one source identity.
pub fn process_metadata(ident: &SourceIdentity) -> TraceEvent {
    TraceEvent {
        name: "process_name".to_string(),
        ph: Phase::Metadata,
        pid: ident.derived_pid(),
        tid: None,
        ts: None,
        args: EventArgs {
            name: Some(format!(
                "{} trace for tile ({}, {})",
                ident.source_type, ident.row, ident.col
            )),
        },
    }
}

/// Thread-metadata record naming one event label within a source.
pub fn thread_metadata(ident: &SourceIdentity, label: &str, index: u32) -> TraceEvent {
    TraceEvent {
        name: "thread_name".to_string(),
        ph: Phase::Metadata,
        pid: ident.derived_pid(),
        tid: Some(index),
        ts: None,
        args: EventArgs {
            name: Some(label.to_string()),
        },
    }
}

/// Begin/end record pairs for one timeline interval.
///
/// Every label in the interval's set gets one pair, with the thread id
/// taken from the label's position in the supplied list.
fn interval_records(
    ident: &SourceIdentity,
    interval: &TimelineInterval,
    labels: &[String],
) -> Result<Vec<TraceEvent>, EmitError> {
    let mut records = Vec::with_capacity(interval.labels.len() * 2);
    for label in &interval.labels {
        let tid = thread_index(label, labels)?;
        let begin = TraceEvent {
            name: label.to_string(),
            ph: Phase::Begin,
            pid: ident.derived_pid(),
            tid: Some(tid),
            ts: Some(interval.start),
            args: EventArgs::default(),
        };
        let end = TraceEvent {
            ph: Phase::End,
            ts: Some(interval.end),
            ..begin.clone()
        };
        records.push(begin);
        records.push(end);
    }
    Ok(records)
}

/// Position of an interval label in the supplied label list.
fn thread_index(label: &EventLabel, labels: &[String]) -> Result<u32, EmitError> {
    let found = match label {
        EventLabel::Named(name) => labels.iter().position(|l| l == name),
        // A raw index only appears when the slot had no configured label,
        // so it can never map back into the list.
        EventLabel::Index(_) => None,
    };
    found
        .map(|i| i as u32)
        .ok_or_else(|| EmitError::UnknownLabel {
            label: label.clone(),
        })
}

/// Emit the full trace-event record stream for a capture.
///
/// Metadata records for every source come first, in identity
/// first-appearance order; event records follow in the same source order.
/// A source whose frame stream fails to decode contributes no event
/// records (a warning is logged) and does not disturb the other sources.
pub fn generate_trace_events(
    buffers: &TraceBuffers,
    labels: &[String],
    stall_label: &str,
) -> Result<Vec<TraceEvent>, EmitError> {
    let mut records = Vec::new();

    for (ident, _) in buffers.iter() {
        records.push(process_metadata(ident));
        for (index, label) in labels.iter().enumerate() {
            records.push(thread_metadata(ident, label, index as u32));
        }
    }

    for (ident, words) in buffers.iter() {
        let frames = match decode_frames(words, labels) {
            Ok(frames) => frames,
            Err(err) => {
                log::warn!("dropping trace for {ident}: {err}");
                continue;
            }
        };
        let mut timeline = construct_timeline(&frames);
        trim_trailing_stalls(&mut timeline, stall_label);
        for interval in &timeline {
            records.extend(interval_records(ident, interval, labels)?);
        }
    }

    Ok(records)
}
