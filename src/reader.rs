//! Decoding of trace byte streams.
//!
//! The inverse of [`OutputBuffer`](crate::output::OutputBuffer) framing:
//! splits a byte stream into chunks and parts, validating every length and
//! offset against the bytes actually present.
//!
//! # Examples
//!
//! ```rust
//! use tracciato::output::{ChunkHeader, OutputBuffer, PartHeader};
//! use tracciato::reader::decode_chunks;
//!
//! let mut bytes = Vec::new();
//! let mut output = OutputBuffer::new(&mut bytes);
//! let mut parts = [PartHeader::new(0x99, 3)];
//! output.start_chunk(ChunkHeader::new(1, 2, 0, 0), &mut parts).unwrap();
//! output.append_bytes(b"abc").unwrap();
//! output.align().unwrap();
//!
//! let chunks = decode_chunks(&bytes).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].parts[0].payload, b"abc");
//! ```

use crate::error::{Result, TraceError};
use crate::output::{ChunkHeader, PartHeader, CHUNK_HEADER_SIZE, PART_HEADER_SIZE};

/// One part of a decoded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPart<'a> {
    /// Part header as written.
    pub header: PartHeader,
    /// Raw payload, without alignment padding.
    pub payload: &'a [u8],
}

/// One decoded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChunk<'a> {
    /// Chunk header as written.
    pub header: ChunkHeader,
    /// Parts in chunk order.
    pub parts: Vec<DecodedPart<'a>>,
}

impl<'a> DecodedChunk<'a> {
    /// First part with the given type.
    pub fn part(&self, part_type: u32) -> Option<&DecodedPart<'a>> {
        self.parts.iter().find(|p| p.header.part_type == part_type)
    }
}

fn malformed(msg: impl Into<String>) -> TraceError {
    TraceError::Malformed(msg.into())
}

/// Splits `bytes` into chunks.
pub fn decode_chunks(bytes: &[u8]) -> Result<Vec<DecodedChunk<'_>>> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let rest = &bytes[pos..];
        let header = ChunkHeader::decode(rest)
            .ok_or_else(|| malformed(format!("truncated chunk header at byte {pos}")))?;

        let length = header.length as usize;
        let part_count = header.part_count as usize;
        let headers_len = CHUNK_HEADER_SIZE + part_count * PART_HEADER_SIZE;
        if length < headers_len || length > rest.len() {
            return Err(malformed(format!(
                "chunk {} at byte {pos} declares {length} bytes",
                header.id
            )));
        }
        let chunk = &rest[..length];
        let region = &chunk[headers_len..];

        let parts = (0..part_count)
            .map(|i| {
                let at = CHUNK_HEADER_SIZE + i * PART_HEADER_SIZE;
                let part = PartHeader::decode(&chunk[at..])
                    .ok_or_else(|| malformed("truncated part header"))?;
                let start = part.offset as usize;
                let payload = region
                    .get(start..start + part.length as usize)
                    .ok_or_else(|| {
                        malformed(format!("part {i} of chunk {} out of bounds", header.id))
                    })?;
                Ok(DecodedPart {
                    header: part,
                    payload,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        chunks.push(DecodedChunk { header, parts });
        pos += length;
    }
    Ok(chunks)
}

/// Decodes a string-table payload into its strings, in id order.
pub fn decode_strings(payload: &[u8]) -> Result<Vec<String>> {
    let Some(body) = payload.strip_suffix(&[0]) else {
        return if payload.is_empty() {
            Ok(Vec::new())
        } else {
            Err(malformed("string table is not null-terminated"))
        };
    };
    body.split(|&b| b == 0)
        .map(|s| String::from_utf8(s.to_vec()).map_err(|e| malformed(e.to_string())))
        .collect()
}

/// Decodes an event-log payload into words.
pub fn decode_words(payload: &[u8]) -> Result<Vec<u32>> {
    if payload.len() % 4 != 0 {
        return Err(malformed(format!(
            "event payload of {} bytes is not word aligned",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}
