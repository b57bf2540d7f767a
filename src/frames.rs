//! Trace frame decoder.
//!
//! Each per-source buffer is a dense, non-byte-aligned bitstream. Words
//! contribute their bits most-significant-first and concatenate in buffer
//! order; frames are identified by a variable-length opcode prefix and have
//! a fixed total width per variant.
//!
//! # Encoding
//!
//! ```text
//! Variant    Prefix               Fields (bit offsets within frame)   Width
//! Start      11110000 / 11110100  timer       [8..64)                 64
//! Stop       110111               cycles      [16..32)                32
//! Single0    0                    event [1..4)   cycles [4..8)         8
//! Single1    100                  event [3..6)   cycles [6..16)       16
//! Single2    101                  event [3..6)   cycles [6..24)       24
//! Multiple0  1100                 mask  [4..12)  cycles [12..16)      16
//! Multiple1  110100               mask  [6..14)  cycles [14..24)      24
//! Multiple2  110101               mask  [6..14)  cycles [14..32)      32
//! Repeat0    1110                 repeats [4..8)                       8
//! Repeat1    110110               repeats [6..16)                     16
//! Filler     11111110             -                                    8
//! Sync       11111111             -                                    8
//! ```
//!
//! The prefixes form a prefix code, but only when matched in the order
//! above: the `1111`-prefixed variants must be tried before the shorter
//! `111x`/`11xx` codes that would otherwise shadow them.
//!
//! Decoding is an iterative loop over a bit cursor. Traces can hold far
//! more frames than a call stack can hold activation records, so there is
//! no recursive descent here.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

/// Errors that end the decode of one source buffer.
///
/// A decode failure is scoped to the buffer it occurred in; other sources
/// in the same capture decode independently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameDecodeError {
    /// No opcode prefix matches the bits at the cursor.
    #[error("no opcode matches bit pattern 0b{window:08b} at bit {pos}")]
    UnknownOpcode {
        /// Bit cursor position where matching failed.
        pos: usize,
        /// The next (up to) eight bits at the cursor, left-aligned.
        window: u8,
    },

    /// A matched frame extends past the end of the stream.
    #[error("truncated frame at bit {pos}: need {needed} bits, have {have}")]
    Truncated {
        /// Bit cursor position of the frame start.
        pos: usize,
        /// Total width of the matched variant.
        needed: usize,
        /// Bits remaining in the stream.
        have: usize,
    },
}

/// An event identifier carried by a frame.
///
/// The hardware encodes events as small slot indices. When the caller
/// supplies a label for the slot, the decoded frame carries the label;
/// otherwise it keeps the raw index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventLabel {
    /// Slot resolved against the supplied label list.
    Named(String),
    /// Slot index with no configured label.
    Index(u32),
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// One decoded unit of the trace encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Trace session start, carrying the 56-bit hardware timer value.
    Start {
        /// Free-running timer snapshot at trace start.
        timer: u64,
    },
    /// Trace session stop.
    Stop {
        /// Cycle count field.
        cycles: u32,
    },
    /// One event, 4-bit cycle delta.
    Single0 { event: EventLabel, cycles: u32 },
    /// One event, 10-bit cycle delta.
    Single1 { event: EventLabel, cycles: u32 },
    /// One event, 18-bit cycle delta.
    Single2 { event: EventLabel, cycles: u32 },
    /// Concurrent event set, 4-bit cycle delta.
    Multiple0 { events: Vec<EventLabel>, cycles: u32 },
    /// Concurrent event set, 10-bit cycle delta.
    Multiple1 { events: Vec<EventLabel>, cycles: u32 },
    /// Concurrent event set, 18-bit cycle delta.
    Multiple2 { events: Vec<EventLabel>, cycles: u32 },
    /// Repeat the previous emission, 4-bit count.
    Repeat0 { repeats: u32 },
    /// Repeat the previous emission, 10-bit count.
    Repeat1 { repeats: u32 },
    /// Padding up to the next packet boundary.
    Filler,
    /// Periodic hardware re-synchronization marker.
    Sync,
}

impl Frame {
    /// Total bit width of this variant. Decoding advances the cursor by
    /// exactly this much.
    pub fn bit_width(&self) -> usize {
        match self {
            Self::Start { .. } => 64,
            Self::Stop { .. } => 32,
            Self::Single0 { .. } => 8,
            Self::Single1 { .. } => 16,
            Self::Single2 { .. } => 24,
            Self::Multiple0 { .. } => 16,
            Self::Multiple1 { .. } => 24,
            Self::Multiple2 { .. } => 32,
            Self::Repeat0 { .. } => 8,
            Self::Repeat1 { .. } => 16,
            Self::Filler | Self::Sync => 8,
        }
    }

    /// The variant's name, for occurrence reporting.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "Start",
            Self::Stop { .. } => "Stop",
            Self::Single0 { .. } => "Single0",
            Self::Single1 { .. } => "Single1",
            Self::Single2 { .. } => "Single2",
            Self::Multiple0 { .. } => "Multiple0",
            Self::Multiple1 { .. } => "Multiple1",
            Self::Multiple2 { .. } => "Multiple2",
            Self::Repeat0 { .. } => "Repeat0",
            Self::Repeat1 { .. } => "Repeat1",
            Self::Filler => "Filler",
            Self::Sync => "Sync",
        }
    }
}

/// Total bit length of a word buffer.
#[inline]
fn bit_len(words: &[u32]) -> usize {
    words.len() * 32
}

/// Read `len` bits starting at absolute bit offset `start`, MSB-first.
///
/// Callers must keep `start + len` within the stream and `len <= 64`.
fn read_bits(words: &[u32], start: usize, len: usize) -> u64 {
    debug_assert!(len <= 64);
    debug_assert!(start + len <= bit_len(words));
    let mut value = 0u64;
    for offset in start..start + len {
        let bit = (words[offset / 32] >> (31 - (offset % 32))) & 1;
        value = (value << 1) | u64::from(bit);
    }
    value
}

/// True if the `len`-bit pattern `prefix` matches the stream at `pos`.
///
/// A prefix longer than the remaining stream cannot match.
#[inline]
fn prefix_matches(words: &[u32], pos: usize, remaining: usize, prefix: u64, len: usize) -> bool {
    remaining >= len && read_bits(words, pos, len) == prefix
}

/// Resolve a slot index against the supplied label list.
///
/// In-range indices always resolve to the label; out-of-range indices keep
/// the raw number. Never fails.
fn resolve_label(index: u32, labels: &[String]) -> EventLabel {
    match labels.get(index as usize) {
        Some(name) => EventLabel::Named(name.clone()),
        None => EventLabel::Index(index),
    }
}

/// Expand an 8-bit concurrent-event mask into its event identifiers.
///
/// Bit position `p`, counted from the mask's most significant bit, encodes
/// logical slot `7 - p`. Identifiers come out in mask-scan order.
fn resolve_mask(mask: u8, labels: &[String]) -> Vec<EventLabel> {
    let mut events = Vec::new();
    for p in 0..8u32 {
        if mask & (0x80 >> p) != 0 {
            events.push(resolve_label(7 - p, labels));
        }
    }
    events
}

/// Decode one source buffer into its ordered frame sequence.
///
/// This is a pure function of its inputs: every call starts from a fresh
/// accumulator, and decoding the same buffer twice yields the same frames.
/// On success the consumed bit widths sum to exactly the buffer's total
/// bit length.
pub fn decode_frames(words: &[u32], labels: &[String]) -> Result<Vec<Frame>, FrameDecodeError> {
    let total = bit_len(words);
    let mut frames = Vec::new();
    let mut pos = 0;

    while pos < total {
        let remaining = total - pos;

        // Match order is load-bearing: Start/Filler/Sync carry the longest
        // prefixes and must win before the shorter codes are tried.
        let frame = if prefix_matches(words, pos, remaining, 0b1111_0000, 8)
            || prefix_matches(words, pos, remaining, 0b1111_0100, 8)
        {
            require(pos, 64, remaining)?;
            Frame::Start {
                timer: read_bits(words, pos + 8, 56),
            }
        } else if prefix_matches(words, pos, remaining, 0b110111, 6) {
            require(pos, 32, remaining)?;
            Frame::Stop {
                cycles: read_bits(words, pos + 16, 16) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b0, 1) {
            require(pos, 8, remaining)?;
            Frame::Single0 {
                event: resolve_label(read_bits(words, pos + 1, 3) as u32, labels),
                cycles: read_bits(words, pos + 4, 4) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b100, 3) {
            require(pos, 16, remaining)?;
            Frame::Single1 {
                event: resolve_label(read_bits(words, pos + 3, 3) as u32, labels),
                cycles: read_bits(words, pos + 6, 10) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b101, 3) {
            require(pos, 24, remaining)?;
            Frame::Single2 {
                event: resolve_label(read_bits(words, pos + 3, 3) as u32, labels),
                cycles: read_bits(words, pos + 6, 18) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b1100, 4) {
            require(pos, 16, remaining)?;
            Frame::Multiple0 {
                events: resolve_mask(read_bits(words, pos + 4, 8) as u8, labels),
                cycles: read_bits(words, pos + 12, 4) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b110100, 6) {
            require(pos, 24, remaining)?;
            Frame::Multiple1 {
                events: resolve_mask(read_bits(words, pos + 6, 8) as u8, labels),
                cycles: read_bits(words, pos + 14, 10) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b110101, 6) {
            require(pos, 32, remaining)?;
            Frame::Multiple2 {
                events: resolve_mask(read_bits(words, pos + 6, 8) as u8, labels),
                cycles: read_bits(words, pos + 14, 18) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b1110, 4) {
            require(pos, 8, remaining)?;
            Frame::Repeat0 {
                repeats: read_bits(words, pos + 4, 4) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b110110, 6) {
            require(pos, 16, remaining)?;
            Frame::Repeat1 {
                repeats: read_bits(words, pos + 6, 10) as u32,
            }
        } else if prefix_matches(words, pos, remaining, 0b1111_1110, 8) {
            Frame::Filler
        } else if prefix_matches(words, pos, remaining, 0b1111_1111, 8) {
            Frame::Sync
        } else {
            return Err(FrameDecodeError::UnknownOpcode {
                pos,
                window: leading_window(words, pos, remaining),
            });
        };

        log::trace!("bit {pos}: {}", frame.variant_name());
        pos += frame.bit_width();
        frames.push(frame);
    }

    Ok(frames)
}

/// Check that a matched frame fits in the remaining stream.
#[inline]
fn require(pos: usize, needed: usize, have: usize) -> Result<(), FrameDecodeError> {
    if needed > have {
        Err(FrameDecodeError::Truncated { pos, needed, have })
    } else {
        Ok(())
    }
}

/// The next (up to) eight bits at the cursor, left-aligned into a byte.
fn leading_window(words: &[u32], pos: usize, remaining: usize) -> u8 {
    let len = remaining.min(8);
    (read_bits(words, pos, len) << (8 - len)) as u8
}

/// Count frames per variant, in first-appearance order.
pub fn frame_occurrence_count(frames: &[Frame]) -> IndexMap<&'static str, usize> {
    let mut counts = IndexMap::new();
    for frame in frames {
        *counts.entry(frame.variant_name()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble (value, bit-width) pieces into a word-aligned stream.
    fn assemble(pieces: &[(u64, usize)]) -> Vec<u32> {
        let mut bits: Vec<bool> = Vec::new();
        for &(value, len) in pieces {
            for i in (0..len).rev() {
                bits.push((value >> i) & 1 == 1);
            }
        }
        assert_eq!(bits.len() % 32, 0, "test stream must be word aligned");
        bits.chunks(32)
            .map(|chunk| chunk.iter().fold(0u32, |acc, &b| (acc << 1) | u32::from(b)))
            .collect()
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Every opcode prefix as (pattern, bit length), in match order.
    const PREFIXES: [(u64, usize); 13] = [
        (0b1111_0000, 8),
        (0b1111_0100, 8),
        (0b110111, 6),
        (0b0, 1),
        (0b100, 3),
        (0b101, 3),
        (0b1100, 4),
        (0b110100, 6),
        (0b110101, 6),
        (0b1110, 4),
        (0b110110, 6),
        (0b1111_1110, 8),
        (0b1111_1111, 8),
    ];

    #[test]
    fn test_prefix_code_has_no_ambiguity() {
        // For every possible 8-bit leading window, at most one table entry
        // may match as a prefix.
        for window in 0u32..256 {
            let matches = PREFIXES
                .iter()
                .filter(|&&(pattern, len)| u64::from(window >> (8 - len)) == pattern)
                .count();
            assert!(
                matches <= 1,
                "window 0b{window:08b} matches {matches} opcodes"
            );
        }
    }

    #[test]
    fn test_decode_single0() {
        // 0 000 0011 = Single0(event 0, 3 cycles), padded with fillers.
        let words = assemble(&[
            (0b0000_0011, 8),
            (0b1111_1110, 8),
            (0b1111_1110, 8),
            (0b1111_1110, 8),
        ]);
        let frames = decode_frames(&words, &labels(&["KERNEL_START"])).unwrap();
        assert_eq!(
            frames[0],
            Frame::Single0 {
                event: EventLabel::Named("KERNEL_START".to_string()),
                cycles: 3
            }
        );
        assert_eq!(&frames[1..], &[Frame::Filler, Frame::Filler, Frame::Filler]);
    }

    #[test]
    fn test_decode_start_and_stop() {
        let words = assemble(&[
            (0b1111_0000, 8),
            (0xAB_CDEF, 56),
            (0b110111, 6),
            (0, 10),
            (1234, 16),
        ]);
        let frames = decode_frames(&words, &[]).unwrap();
        assert_eq!(
            frames,
            vec![
                Frame::Start { timer: 0xAB_CDEF },
                Frame::Stop { cycles: 1234 },
            ]
        );
    }

    #[test]
    fn test_decode_start_alternate_prefix() {
        let words = assemble(&[(0b1111_0100, 8), (7, 56)]);
        let frames = decode_frames(&words, &[]).unwrap();
        assert_eq!(frames, vec![Frame::Start { timer: 7 }]);
    }

    #[test]
    fn test_decode_multiple0_mask_order() {
        // Mask 0b00000011: bits at positions 6 and 7 from the MSB, which
        // encode logical slots 1 and 0, scanned in that order.
        let words = assemble(&[
            (0b1100, 4),
            (0b0000_0011, 8),
            (9, 4),
            (0b1111_1110, 8),
            (0b1111_1110, 8),
        ]);
        let frames = decode_frames(&words, &labels(&["A", "B"])).unwrap();
        assert_eq!(
            frames[0],
            Frame::Multiple0 {
                events: vec![
                    EventLabel::Named("B".to_string()),
                    EventLabel::Named("A".to_string()),
                ],
                cycles: 9
            }
        );
    }

    #[test]
    fn test_out_of_range_slot_keeps_raw_index() {
        // Slot 5 with only a two-entry label list.
        let words = assemble(&[(0b0, 1), (5, 3), (0, 4), (0b1111_1110, 8), (0, 16)]);
        let frames = decode_frames(&words, &labels(&["A", "B"])).unwrap();
        assert_eq!(
            frames[0],
            Frame::Single0 {
                event: EventLabel::Index(5),
                cycles: 0
            }
        );
        // The trailing 16 zero bits decode as two more Single0 frames.
        assert_eq!(frames.len(), 4);
    }

    #[test]
    fn test_decode_repeat_and_sync() {
        let words = assemble(&[
            (0b1110, 4),
            (3, 4),
            (0b110110, 6),
            (513, 10),
            (0b1111_1111, 8),
        ]);
        let frames = decode_frames(&words, &[]).unwrap();
        assert_eq!(
            frames,
            vec![
                Frame::Repeat0 { repeats: 3 },
                Frame::Repeat1 { repeats: 513 },
                Frame::Sync,
            ]
        );
    }

    #[test]
    fn test_bit_exact_coverage() {
        let words = assemble(&[
            (0b1111_0000, 8),
            (99, 56),
            (0b100, 3),
            (2, 3),
            (700, 10),
            (0b101, 3),
            (1, 3),
            (0x2_0000, 18),
            (0b110101, 6),
            (0b1010_0101, 8),
            (0x15555, 18),
            (0b1111_1110, 8),
            (0b1111_1110, 8),
            (0b1111_1110, 8),
        ]);
        let frames = decode_frames(&words, &labels(&["A", "B", "C"])).unwrap();
        let consumed: usize = frames.iter().map(Frame::bit_width).sum();
        assert_eq!(consumed, words.len() * 32);
    }

    #[test]
    fn test_unknown_opcode_is_an_error() {
        // 11110001 matches neither Start pattern nor any other prefix.
        let words = assemble(&[(0b1111_0001, 8), (0, 24)]);
        let err = decode_frames(&words, &[]).unwrap_err();
        assert_eq!(
            err,
            FrameDecodeError::UnknownOpcode {
                pos: 0,
                window: 0b1111_0001
            }
        );
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        // A Start prefix with only one word left cannot hold a 64-bit frame.
        let words = assemble(&[(0b1111_0000, 8), (0, 24)]);
        let err = decode_frames(&words, &[]).unwrap_err();
        assert_eq!(
            err,
            FrameDecodeError::Truncated {
                pos: 0,
                needed: 64,
                have: 32
            }
        );
    }

    #[test]
    fn test_empty_buffer_decodes_to_no_frames() {
        assert!(decode_frames(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_is_repeatable() {
        let words = assemble(&[(0b0000_0011, 8), (0b1110, 4), (2, 4), (0, 16)]);
        let first = decode_frames(&words, &labels(&["A"])).unwrap();
        let second = decode_frames(&words, &labels(&["A"])).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_frame_occurrence_count() {
        let words = assemble(&[(0b0000_0011, 8), (0b0000_0100, 8), (0b1110, 4), (1, 4), (0b1111_1111, 8)]);
        let frames = decode_frames(&words, &[]).unwrap();
        let counts = frame_occurrence_count(&frames);
        assert_eq!(counts.get("Single0"), Some(&2));
        assert_eq!(counts.get("Repeat0"), Some(&1));
        assert_eq!(counts.get("Sync"), Some(&1));
    }
}
