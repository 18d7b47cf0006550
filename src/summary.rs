//! Summary types describing what a save wrote.
//!
//! A [`FlushSummary`] lists every chunk written by one
//! [`Recorder::save`](crate::recorder::Recorder::save), with the layout of each
//! part. With the `serde` feature the types are serializable, and with the
//! `json` feature [`FlushSummary::to_json`] renders them directly.
//!
//! ```toml
//! [dependencies]
//! tracciato = { version = "0.1", features = ["json"] }
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::output::{PartHeader, PART_TYPE_EVENTS, PART_TYPE_STRING_TABLE};

/// Known part types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PartKind {
    /// Interned strings.
    StringTable,
    /// Event words.
    Events,
    /// Any other part type.
    Other(u32),
}

impl From<u32> for PartKind {
    fn from(part_type: u32) -> Self {
        match part_type {
            PART_TYPE_STRING_TABLE => PartKind::StringTable,
            PART_TYPE_EVENTS => PartKind::Events,
            other => PartKind::Other(other),
        }
    }
}

/// Layout of one part inside a written chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PartSummary {
    /// What the part contains.
    pub kind: PartKind,
    /// Offset from the start of the payload region.
    pub offset: u32,
    /// Raw payload length in bytes.
    pub length: u32,
}

impl From<&PartHeader> for PartSummary {
    fn from(header: &PartHeader) -> Self {
        Self {
            kind: header.part_type.into(),
            offset: header.offset,
            length: header.length,
        }
    }
}

/// One chunk written by a save.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkSummary {
    /// Chunk id.
    pub id: u32,
    /// Total chunk length in bytes.
    pub length: u32,
    /// Part layouts, in chunk order.
    pub parts: Vec<PartSummary>,
}

impl ChunkSummary {
    /// Creates a summary from the headers a chunk was framed with.
    pub fn new(id: u32, length: u32, parts: &[PartHeader]) -> Self {
        Self {
            id,
            length,
            parts: parts.iter().map(PartSummary::from).collect(),
        }
    }

    /// Raw length of the event-log part, in 32-bit words.
    pub fn event_words(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| p.kind == PartKind::Events)
            .map(|p| p.length as usize / 4)
            .sum()
    }
}

/// Everything written by one save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlushSummary {
    /// Chunks in write order.
    pub chunks: Vec<ChunkSummary>,
}

impl FlushSummary {
    /// Total bytes written.
    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.length as u64).sum()
    }

    /// Total event words written across all chunks.
    pub fn total_event_words(&self) -> usize {
        self.chunks.iter().map(ChunkSummary::event_words).sum()
    }

    /// Finds a chunk by id.
    pub fn get(&self, id: u32) -> Option<&ChunkSummary> {
        self.chunks.iter().find(|c| c.id == id)
    }

    /// Renders the summary as JSON.
    #[cfg(feature = "json")]
    pub fn to_json(&self, pretty: bool) -> crate::error::Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlushSummary {
        FlushSummary {
            chunks: vec![
                ChunkSummary::new(
                    0,
                    80,
                    &[
                        PartHeader {
                            part_type: PART_TYPE_STRING_TABLE,
                            offset: 0,
                            length: 10,
                        },
                        PartHeader {
                            part_type: PART_TYPE_EVENTS,
                            offset: 12,
                            length: 20,
                        },
                    ],
                ),
                ChunkSummary::new(1, 60, &[PartHeader::new(0x99, 4)]),
            ],
        }
    }

    #[test]
    fn test_part_kind_from_type() {
        assert_eq!(PartKind::from(0x30000), PartKind::StringTable);
        assert_eq!(PartKind::from(0x20002), PartKind::Events);
        assert_eq!(PartKind::from(7), PartKind::Other(7));
    }

    #[test]
    fn test_totals() {
        let summary = sample();
        assert_eq!(summary.total_bytes(), 140);
        assert_eq!(summary.total_event_words(), 5);
        assert_eq!(summary.get(0).unwrap().parts[1].offset, 12);
        assert!(summary.get(2).is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let summary = sample();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("string_table"));
        let back: FlushSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json() {
        let json = sample().to_json(false).unwrap();
        assert!(json.starts_with(r#"{"chunks":[{"id":0,"length":80"#));
    }
}
