//! xdna-trace library
//!
//! Decode logic for AMD XDNA NPU hardware trace captures: raw trace words
//! in, visualizer-consumable trace-event records out.
//!
//! Pipeline: [`words`] parses the textual capture into 32-bit words,
//! [`packet`] groups them into packets, [`buffers`] demultiplexes packet
//! payloads into per-source streams, [`frames`] decodes each stream's
//! prefix-coded bitstream into frames, [`timeline`] folds frames into
//! labeled intervals, and [`perfetto`] maps intervals onto trace-event
//! records.

pub mod words;
pub mod packet;
pub mod buffers;
pub mod frames;
pub mod timeline;
pub mod perfetto;
