//! The two-phase serialization contract shared by every chunk component.
//!
//! A component that wants to be embedded in a chunk implements [`Part`]:
//!
//! 1. [`Part::populate_header`] fixes the plan: it records the exact raw
//!    payload length the component commits to write.
//! 2. [`OutputBuffer::start_chunk`] lays out every part and writes the headers.
//! 3. [`Part::write_to`] writes the payload, checked against the committed
//!    length. Any drift is reported as an error instead of producing a chunk
//!    whose headers lie about its contents.
//!
//! [`write_chunk`] drives the whole sequence.

use tracing::debug;

use crate::error::Result;
use crate::output::{ChunkHeader, OutputBuffer, PartHeader};

/// A component that serializes itself as one part of a chunk.
pub trait Part {
    /// Records the part type and the exact raw payload length into `header`.
    fn populate_header(&self, header: &mut PartHeader) -> Result<()>;

    /// Writes the payload committed by a previous [`populate_header`] call,
    /// followed by alignment padding.
    ///
    /// Fails without writing past the committed length if the component can
    /// no longer produce exactly `header.length` bytes.
    ///
    /// [`populate_header`]: Part::populate_header
    fn write_to(&self, header: &PartHeader, output: &mut OutputBuffer<'_>) -> Result<()>;
}

/// Writes one complete chunk made of `parts`, in order.
///
/// Returns the part headers as laid out in the chunk. The first failing
/// [`Part::write_to`] aborts the chunk; bytes already handed to the sink are
/// not rolled back.
pub fn write_chunk(
    output: &mut OutputBuffer<'_>,
    header: ChunkHeader,
    parts: &[&dyn Part],
) -> Result<Vec<PartHeader>> {
    let mut headers = vec![PartHeader::default(); parts.len()];
    for (part, part_header) in parts.iter().zip(headers.iter_mut()) {
        part.populate_header(part_header)?;
    }

    let length = output.start_chunk(header, &mut headers)?;
    debug!(id = header.id, length, parts = parts.len(), "chunk framed");

    for (part, part_header) in parts.iter().zip(headers.iter()) {
        part.write_to(part_header, output)?;
    }
    Ok(headers)
}
