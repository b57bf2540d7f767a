//! Per-source trace buffers.
//!
//! A single capture multiplexes trace streams from many tile modules onto
//! one word sequence. Packets are routed here into independent per-source
//! buffers so each stream can be decoded on its own.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::packet::{PacketHeader, SourceType, TracePacket};

/// Unique identity of one trace stream: tile location plus source.
///
/// Two packets with identical fields always route to the same buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceIdentity {
    /// Tile row.
    pub row: u32,
    /// Tile column.
    pub col: u32,
    /// Source id within the tile module.
    pub id: u32,
    /// Which tile module the stream comes from.
    pub source_type: SourceType,
}

impl SourceIdentity {
    /// Build the identity for a packet header.
    pub fn from_header(header: &PacketHeader) -> Self {
        Self {
            row: header.row,
            col: header.col,
            id: header.id,
            source_type: header.source_type,
        }
    }

    /// Derive the numeric process id used in the emitted trace events.
    ///
    /// The id is a stable hash of the identity reduced modulo 1000, so two
    /// distinct identities can collide on large arrays. Collisions merge
    /// their process groups in the viewer; the decode itself is unaffected.
    pub fn derived_pid(&self) -> u32 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        (hasher.finish() % 1000) as u32
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} id {} at tile ({}, {})",
            self.source_type, self.id, self.row, self.col
        )
    }
}

/// All per-source buffers of one capture, keyed by identity.
///
/// Buffers are append-only and keep the order in which identities first
/// appeared, so downstream emission is deterministic. This is the sole
/// mutation point for buffer contents.
#[derive(Debug, Default)]
pub struct TraceBuffers {
    buffers: IndexMap<SourceIdentity, Vec<u32>>,
}

impl TraceBuffers {
    /// Create an empty buffer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one packet's payload words to its source buffer.
    ///
    /// The buffer is created on first use; payload words are appended in
    /// packet order with no reordering or deduplication.
    pub fn add(&mut self, packet: &TracePacket) {
        let ident = SourceIdentity::from_header(&packet.header);
        self.buffers
            .entry(ident)
            .or_default()
            .extend_from_slice(&packet.dwords);
    }

    /// Iterate buffers in identity first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceIdentity, &[u32])> {
        self.buffers.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Look up one source's words.
    pub fn get(&self, ident: &SourceIdentity) -> Option<&[u32]> {
        self.buffers.get(ident).map(Vec::as_slice)
    }

    /// Number of distinct sources seen so far.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True if no packet has been added yet.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
