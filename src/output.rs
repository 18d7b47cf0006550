//! Binary writer and chunk framing for the trace format.
//!
//! A trace is a sequence of chunks. Each chunk starts with a fixed
//! [`ChunkHeader`], followed by one [`PartHeader`] per embedded payload,
//! followed by the payloads themselves, each padded up to [`ALIGNMENT`]:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ ChunkHeader  id type length start_time end_time part_count (24 B) │
//! ├───────────────────────────────────────────────────────────────────┤
//! │ PartHeader[0]  type offset length                          (12 B) │
//! │ PartHeader[1]  type offset length                          (12 B) │
//! ├───────────────────────────────────────────────────────────────────┤
//! │ payload[0] ░░ pad │ payload[1] ░░ pad │ ...                       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Part offsets are relative to the start of the payload region. All 32-bit
//! fields are little-endian.

use std::io::Write;

use crate::error::{Result, TraceError};

/// Byte boundary every part payload is padded to.
pub const ALIGNMENT: usize = 4;

/// Encoded size of a [`ChunkHeader`].
pub const CHUNK_HEADER_SIZE: usize = 6 * std::mem::size_of::<u32>();

/// Encoded size of a [`PartHeader`].
pub const PART_HEADER_SIZE: usize = 3 * std::mem::size_of::<u32>();

/// Part type of a serialized [`StringTable`](crate::strings::StringTable).
pub const PART_TYPE_STRING_TABLE: u32 = 0x30000;

/// Part type of a serialized [`EventBuffer`](crate::events::EventBuffer).
pub const PART_TYPE_EVENTS: u32 = 0x20002;

/// Rounds `length` up to the next multiple of [`ALIGNMENT`].
///
/// Lengths that are already aligned are returned unchanged.
///
/// ```rust
/// use tracciato::output::padded_length;
///
/// assert_eq!(padded_length(0), 0);
/// assert_eq!(padded_length(5), 8);
/// assert_eq!(padded_length(8), 8);
/// ```
#[inline]
pub const fn padded_length(length: usize) -> usize {
    let rem = length % ALIGNMENT;
    if rem != 0 {
        length + (ALIGNMENT - rem)
    } else {
        length
    }
}

/// Header written once at the start of every chunk.
///
/// `length` is ignored by [`OutputBuffer::start_chunk`], which always writes
/// the computed length of the whole chunk instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Opaque producer-assigned identifier.
    pub id: u32,
    /// Format discriminator.
    pub chunk_type: u32,
    /// Total chunk size in bytes, headers included.
    pub length: u32,
    /// Start of the time range covered by the chunk.
    pub start_time: u32,
    /// End of the time range covered by the chunk.
    pub end_time: u32,
    /// Number of part headers following this header.
    pub part_count: u32,
}

impl ChunkHeader {
    /// Creates a header; `length` and `part_count` are filled in when framed.
    pub const fn new(id: u32, chunk_type: u32, start_time: u32, end_time: u32) -> Self {
        Self {
            id,
            chunk_type,
            length: 0,
            start_time,
            end_time,
            part_count: 0,
        }
    }

    /// Encodes the header in wire order.
    pub fn encode(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut out = [0u8; CHUNK_HEADER_SIZE];
        let fields = [
            self.id,
            self.chunk_type,
            self.length,
            self.start_time,
            self.end_time,
            self.part_count,
        ];
        for (dst, field) in out.chunks_exact_mut(4).zip(fields) {
            dst.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    /// Decodes a header from the first [`CHUNK_HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Returns `None` if `bytes` is too short.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..CHUNK_HEADER_SIZE)?;
        let word = |i: usize| read_u32(bytes, i * 4);
        Some(Self {
            id: word(0),
            chunk_type: word(1),
            length: word(2),
            start_time: word(3),
            end_time: word(4),
            part_count: word(5),
        })
    }
}

/// Descriptor of one payload embedded in a chunk.
///
/// The owning component fills `part_type` and `length`; `offset` is assigned
/// by [`OutputBuffer::start_chunk`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartHeader {
    /// Identifies the component that produced the payload.
    pub part_type: u32,
    /// Payload offset relative to the start of the payload region.
    pub offset: u32,
    /// Raw payload length before alignment padding.
    pub length: u32,
}

impl PartHeader {
    /// Creates a descriptor with the given type and raw length.
    pub const fn new(part_type: u32, length: u32) -> Self {
        Self {
            part_type,
            offset: 0,
            length,
        }
    }

    /// Encodes the descriptor in wire order.
    pub fn encode(&self) -> [u8; PART_HEADER_SIZE] {
        let mut out = [0u8; PART_HEADER_SIZE];
        let fields = [self.part_type, self.offset, self.length];
        for (dst, field) in out.chunks_exact_mut(4).zip(fields) {
            dst.copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    /// Decodes a descriptor from the first [`PART_HEADER_SIZE`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..PART_HEADER_SIZE)?;
        Some(Self {
            part_type: read_u32(bytes, 0),
            offset: read_u32(bytes, 4),
            length: read_u32(bytes, 8),
        })
    }

    /// Payload length in bytes, padded to [`ALIGNMENT`].
    #[inline]
    pub fn padded_length(&self) -> usize {
        padded_length(self.length as usize)
    }
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

/// Converts a payload length into the `u32` stored in a part header.
pub(crate) fn part_length(length: usize) -> Result<u32> {
    u32::try_from(length).map_err(|_| TraceError::PartTooLarge { length })
}

/// Sequential binary writer over an append-only byte sink.
///
/// `OutputBuffer` counts every byte it hands to the sink, so [`align`]
/// always pads relative to the writer's own running position, independent of
/// what the sink has seen before.
///
/// # Examples
///
/// ```rust
/// use tracciato::output::{ChunkHeader, OutputBuffer, PartHeader};
///
/// let mut sink = Vec::new();
/// let mut output = OutputBuffer::new(&mut sink);
///
/// let mut parts = [PartHeader::new(1, 5), PartHeader::new(2, 8)];
/// let length = output
///     .start_chunk(ChunkHeader::new(7, 2, 0, 0), &mut parts)
///     .unwrap();
///
/// assert_eq!(length, 64);
/// assert_eq!(parts[0].offset, 0);
/// assert_eq!(parts[1].offset, 8);
/// assert_eq!(output.position(), 48);
/// ```
///
/// [`align`]: OutputBuffer::align
pub struct OutputBuffer<'a> {
    sink: &'a mut dyn Write,
    position: u64,
}

impl<'a> OutputBuffer<'a> {
    /// Creates a writer positioned at offset zero.
    pub fn new(sink: &'a mut dyn Write) -> Self {
        Self { sink, position: 0 }
    }

    /// Number of bytes written through this buffer so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Appends raw bytes verbatim.
    #[inline]
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Appends one 32-bit value.
    #[inline]
    pub fn append_u32(&mut self, value: u32) -> Result<()> {
        self.append_bytes(&value.to_le_bytes())
    }

    /// Appends a run of 32-bit values.
    #[cfg(target_endian = "little")]
    #[inline]
    pub fn append_words(&mut self, words: &[u32]) -> Result<()> {
        self.append_bytes(bytemuck::cast_slice(words))
    }

    /// Appends a run of 32-bit values.
    #[cfg(not(target_endian = "little"))]
    pub fn append_words(&mut self, words: &[u32]) -> Result<()> {
        for &word in words {
            self.append_u32(word)?;
        }
        Ok(())
    }

    /// Pads with zero bytes up to the next multiple of [`ALIGNMENT`].
    pub fn align(&mut self) -> Result<()> {
        const ZEROES: [u8; ALIGNMENT] = [0; ALIGNMENT];
        let rem = (self.position % ALIGNMENT as u64) as usize;
        if rem != 0 {
            self.append_bytes(&ZEROES[..ALIGNMENT - rem])?;
        }
        Ok(())
    }

    /// Lays out `parts` and writes the chunk header followed by every part header.
    ///
    /// Each part's `offset` is set to the running sum of the padded lengths
    /// before it. The header is written with the computed total chunk
    /// length and `parts.len()` as part count; the computed length is also
    /// returned. Payloads are not written here: each owner writes its own
    /// afterwards, in the same order.
    pub fn start_chunk(&mut self, header: ChunkHeader, parts: &mut [PartHeader]) -> Result<u32> {
        let mut chunk_length = (CHUNK_HEADER_SIZE + parts.len() * PART_HEADER_SIZE) as u64;
        let mut part_offset = 0u64;
        for part in parts.iter_mut() {
            part.offset = part_length(part_offset as usize)?;
            let aligned = part.padded_length() as u64;
            chunk_length += aligned;
            part_offset += aligned;
        }
        let chunk_length = part_length(chunk_length as usize)?;
        let part_count = part_length(parts.len())?;

        let header = ChunkHeader {
            length: chunk_length,
            part_count,
            ..header
        };
        self.append_bytes(&header.encode())?;
        for part in parts.iter() {
            self.append_bytes(&part.encode())?;
        }
        Ok(chunk_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_length() {
        assert_eq!(padded_length(0), 0);
        assert_eq!(padded_length(1), 4);
        assert_eq!(padded_length(4), 4);
        assert_eq!(padded_length(5), 8);
        assert_eq!(padded_length(7), 8);
    }

    #[test]
    fn test_start_chunk_layout() {
        let mut sink = Vec::new();
        let mut output = OutputBuffer::new(&mut sink);
        let mut parts = [PartHeader::new(0x30000, 5), PartHeader::new(0x20002, 8)];

        let length = output
            .start_chunk(ChunkHeader::new(1, 2, 10, 20), &mut parts)
            .unwrap();

        assert_eq!(length, 64);
        assert_eq!(parts[0].offset, 0);
        assert_eq!(parts[1].offset, 8);
        assert_eq!(sink.len(), CHUNK_HEADER_SIZE + 2 * PART_HEADER_SIZE);
    }

    #[test]
    fn test_start_chunk_writes_computed_length() {
        let mut sink = Vec::new();
        let mut output = OutputBuffer::new(&mut sink);
        let header = ChunkHeader {
            length: 9999,
            part_count: 42,
            ..ChunkHeader::new(3, 2, 100, 200)
        };
        let mut parts = [PartHeader::new(0x20002, 12)];
        output.start_chunk(header, &mut parts).unwrap();

        let decoded = ChunkHeader::decode(&sink).unwrap();
        assert_eq!(decoded.id, 3);
        assert_eq!(decoded.chunk_type, 2);
        assert_eq!(decoded.length, 24 + 12 + 12);
        assert_eq!(decoded.start_time, 100);
        assert_eq!(decoded.end_time, 200);
        assert_eq!(decoded.part_count, 1);

        let part = PartHeader::decode(&sink[CHUNK_HEADER_SIZE..]).unwrap();
        assert_eq!(part, PartHeader::new(0x20002, 12));
    }

    #[test]
    fn test_start_chunk_without_parts() {
        let mut sink = Vec::new();
        let mut output = OutputBuffer::new(&mut sink);
        let length = output.start_chunk(ChunkHeader::default(), &mut []).unwrap();
        assert_eq!(length as usize, CHUNK_HEADER_SIZE);
    }

    #[test]
    fn test_align_tracks_position() {
        let mut sink = Vec::new();
        let mut output = OutputBuffer::new(&mut sink);
        output.append_bytes(b"abcde").unwrap();
        output.align().unwrap();
        assert_eq!(output.position(), 8);
        output.align().unwrap();
        assert_eq!(output.position(), 8);
        assert_eq!(&sink[5..], &[0, 0, 0]);
    }

    #[test]
    fn test_append_words_little_endian() {
        let mut sink = Vec::new();
        let mut output = OutputBuffer::new(&mut sink);
        output.append_words(&[0x0403_0201, 0x0807_0605]).unwrap();
        output.append_u32(0x0c0b_0a09).unwrap();
        assert_eq!(sink, (1u8..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_header_decode_short_input() {
        assert!(ChunkHeader::decode(&[0u8; 23]).is_none());
        assert!(PartHeader::decode(&[0u8; 11]).is_none());
    }

    #[test]
    fn test_sink_error_propagates() {
        struct Full;
        impl Write for Full {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = Full;
        let mut output = OutputBuffer::new(&mut sink);
        let err = output.append_u32(1).unwrap_err();
        assert!(matches!(err, TraceError::Io(_)));
        assert_eq!(output.position(), 0);
    }
}
