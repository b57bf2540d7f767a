//! Trace packet parser.
//!
//! The hardware trace port emits packets as fixed groups of eight 32-bit
//! words: one header word followed by up to seven payload dwords. The
//! header identifies which tile module produced the payload.
//!
//! # Header Layout
//!
//! ```text
//!  31      28 27    21 20   16 15 14  12 11         5 4     0
//! +----------+--------+-------+--+------+------------+-------+
//! |          |  col   |  row  |  | type |            |  id   |
//! +----------+--------+-------+--+------+------------+-------+
//! ```
//!
//! The whole word carries odd parity: the XOR of all 32 bits is 1 for a
//! well-formed header. A parity mismatch is flagged on the packet but does
//! not stop parsing.

use std::fmt;

use thiserror::Error;

/// Number of words in one trace packet group (header + payload).
pub const PACKET_GROUP_WORDS: usize = 8;

/// Errors produced while parsing packet headers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The 3-bit source-type field holds a value outside the known set.
    /// The header cannot be trusted, so the whole run is aborted.
    #[error("unknown source type code {code} in header word 0x{word:08X}")]
    UnknownSourceType {
        /// The raw source-type field value.
        code: u32,
        /// The full header word.
        word: u32,
    },
}

/// The tile module a trace stream originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SourceType {
    /// Compute tile core.
    Core = 0,
    /// Compute tile data memory.
    Mem = 1,
    /// Array interface (shim) tile.
    Intfc = 2,
    /// Dedicated memory tile.
    MemTile = 3,
}

impl SourceType {
    /// Decode the 3-bit source-type field of a header word.
    pub fn from_code(code: u32, word: u32) -> Result<Self, PacketError> {
        match code {
            0 => Ok(Self::Core),
            1 => Ok(Self::Mem),
            2 => Ok(Self::Intfc),
            3 => Ok(Self::MemTile),
            _ => Err(PacketError::UnknownSourceType { code, word }),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Core => "CORE",
            Self::Mem => "MEM",
            Self::Intfc => "INTFC",
            Self::MemTile => "MEMTILE",
        };
        write!(f, "{name}")
    }
}

/// Parsed trace packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Source id within the tile module (bits 0-4).
    pub id: u32,
    /// Which tile module produced the payload (bits 12-14).
    pub source_type: SourceType,
    /// Tile row (bits 16-20).
    pub row: u32,
    /// Tile column (bits 21-27).
    pub col: u32,
    /// Odd-parity check over the full header word.
    pub valid: bool,
}

/// One trace packet: a header plus its payload dwords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePacket {
    /// The parsed header.
    pub header: PacketHeader,
    /// Up to seven trailing payload words, in capture order.
    pub dwords: Vec<u32>,
}

/// Extract the inclusive bit range `start..=end` of a word.
#[inline]
pub fn extract_bits(word: u32, start: u32, end: u32) -> u32 {
    let mask = (1u32 << (end - start + 1)) - 1;
    (word >> start) & mask
}

/// Odd-parity check: XOR of all 32 bits equals 1.
pub fn parity_check(word: u32) -> bool {
    word.count_ones() % 2 == 1
}

/// Parse a single header word.
pub fn parse_header(word: u32) -> Result<PacketHeader, PacketError> {
    let type_code = extract_bits(word, 12, 14);
    Ok(PacketHeader {
        id: extract_bits(word, 0, 4),
        source_type: SourceType::from_code(type_code, word)?,
        row: extract_bits(word, 16, 20),
        col: extract_bits(word, 21, 27),
        valid: parity_check(word),
    })
}

/// Split a flat word list into trace packets.
///
/// Words are consumed in strides of [`PACKET_GROUP_WORDS`]; the first word
/// of each stride is the header, the rest are payload. A short final stride
/// simply yields a packet with fewer payload words. No packet is ever
/// dropped once its header parses.
pub fn parse_packets(words: &[u32]) -> Result<Vec<TracePacket>, PacketError> {
    let mut packets = Vec::with_capacity(words.len() / PACKET_GROUP_WORDS + 1);
    for group in words.chunks(PACKET_GROUP_WORDS) {
        let header = parse_header(group[0])?;
        if !header.valid {
            log::warn!(
                "header word 0x{:08X} fails odd-parity check ({} tile ({}, {}))",
                group[0],
                header.source_type,
                header.row,
                header.col
            );
        }
        packets.push(TracePacket {
            header,
            dwords: group[1..].to_vec(),
        });
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a header word from its fields (without fixing up parity).
    fn header_word(id: u32, source_type: u32, row: u32, col: u32) -> u32 {
        id | (source_type << 12) | (row << 16) | (col << 21)
    }

    #[test]
    fn test_extract_bits() {
        assert_eq!(extract_bits(0xFFFF_FFFF, 0, 4), 0x1F);
        assert_eq!(extract_bits(0x0000_7000, 12, 14), 7);
        assert_eq!(extract_bits(0x0042_0000, 16, 20), 2);
        assert_eq!(extract_bits(0x0040_0000, 21, 27), 2);
    }

    #[test]
    fn test_parse_header_fields() {
        let word = header_word(3, 0, 1, 2);
        let header = parse_header(word).unwrap();
        assert_eq!(header.id, 3);
        assert_eq!(header.source_type, SourceType::Core);
        assert_eq!(header.row, 1);
        assert_eq!(header.col, 2);
    }

    #[test]
    fn test_parity() {
        // 0x1 has one set bit: odd parity holds.
        assert!(parity_check(0x1));
        // 0x3 has two set bits: parity fails.
        assert!(!parity_check(0x3));

        let header = parse_header(header_word(1, 0, 0, 0)).unwrap();
        assert!(header.valid);
        let header = parse_header(header_word(3, 0, 0, 0)).unwrap();
        assert!(!header.valid);
    }

    #[test]
    fn test_unknown_source_type_is_fatal() {
        let word = header_word(0, 5, 0, 0);
        let err = parse_header(word).unwrap_err();
        assert_eq!(err, PacketError::UnknownSourceType { code: 5, word });
    }

    #[test]
    fn test_packet_grouping() {
        // Two full groups of 8 words.
        let mut words = vec![header_word(0, 0, 1, 2)];
        words.extend(10..17);
        words.push(header_word(1, 1, 3, 4));
        words.extend(20..27);

        let packets = parse_packets(&words).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].dwords, (10..17).collect::<Vec<u32>>());
        assert_eq!(packets[1].header.source_type, SourceType::Mem);
        assert_eq!(packets[1].dwords, (20..27).collect::<Vec<u32>>());
    }

    #[test]
    fn test_short_final_group() {
        // Header plus only three payload words: no padding, no error.
        let words = vec![header_word(0, 0, 0, 0), 1, 2, 3];
        let packets = parse_packets(&words).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].dwords, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_packets(&[]).unwrap().is_empty());
    }
}
