//! Chunked, lock-free event log.
//!
//! An [`EventBuffer`] is written by exactly one thread, through its
//! [`Producer`], and read by any number of flushing threads at the same time.
//! No lock is taken on either side.
//!
//! # Architecture
//!
//! The log is an append-only singly linked list of fixed-capacity chunks:
//!
//! ```text
//!   head                                          current (producer only)
//!    │                                                 │
//!    ▼                                                 ▼
//! ┌─────────────┐  next  ┌─────────────┐  next  ┌─────────────┐
//! │ published=N │ ─────► │ published=N │ ─────► │ published=0 │ ──► null
//! │ ███████████ │        │ ███████████ │        │ ████░░░░░░░ │
//! └─────────────┘        └─────────────┘        └─────────────┘
//!      frozen                 frozen              being written
//! ```
//!
//! When the current chunk cannot hold the next record, the producer
//! allocates a successor and publishes the old chunk with two release stores,
//! in this order:
//!
//! 1. `published_size` of the old chunk = its write cursor
//! 2. `next` of the old chunk = the successor
//!
//! Readers acquire-load `published_size` and `next` on every step, so a
//! chunk that is reachable through `next` always carries its final size.
//! A reader therefore sees a consistent prefix of everything published, and
//! never the in-progress tail of the current chunk.
//!
//! Chunks are only freed when the [`EventBuffer`] itself is dropped, which
//! requires every [`Producer`] and reader to be gone.

mod chunk;
mod producer;

pub use producer::Producer;

use std::fmt::{self, Debug};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use crate::error::{Result, TraceError};
use crate::output::{part_length, OutputBuffer, PartHeader, PART_TYPE_EVENTS};
use crate::part::Part;
use crate::strings::StringTable;

use chunk::Chunk;

/// Smallest chunk size accepted; smaller budgets are raised to this.
pub const MIN_CHUNK_SIZE_BYTES: usize = 1024;

/// Chunk size used when no explicit budget is configured.
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 64 * 1024;

const WORD_SIZE: usize = std::mem::size_of::<u32>();

/// Append-only log of 32-bit event words with lock-free snapshots.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use tracciato::events::EventBuffer;
/// use tracciato::strings::StringTable;
///
/// let buffer = EventBuffer::new(Arc::new(StringTable::new()), 1024);
/// let mut producer = buffer.producer().unwrap();
///
/// // Only one producer at a time.
/// assert!(buffer.producer().is_none());
///
/// producer.append(&[1, 2, 3]).unwrap();
/// assert_eq!(buffer.published_words(), 0); // still in the current chunk
///
/// producer.publish();
/// assert_eq!(buffer.published_words(), 3);
/// ```
pub struct EventBuffer {
    head: NonNull<Chunk>,
    parked: AtomicPtr<Chunk>,
    claimed: AtomicBool,
    chunk_limit: usize,
    strings: Arc<StringTable>,
}

// SAFETY: the chain is only mutated by the single claimed producer, and all
// shared state is published through atomics with release/acquire ordering.
unsafe impl Send for EventBuffer {}
unsafe impl Sync for EventBuffer {}

impl EventBuffer {
    /// Creates a buffer whose chunks hold `chunk_size_bytes` of events.
    ///
    /// The budget is raised to [`MIN_CHUNK_SIZE_BYTES`] if smaller.
    pub fn new(strings: Arc<StringTable>, chunk_size_bytes: usize) -> Arc<Self> {
        let chunk_limit = chunk_size_bytes.max(MIN_CHUNK_SIZE_BYTES) / WORD_SIZE;
        let head = NonNull::from(Box::leak(Chunk::new(chunk_limit)));
        Arc::new(Self {
            head,
            parked: AtomicPtr::new(head.as_ptr()),
            claimed: AtomicBool::new(false),
            chunk_limit,
            strings,
        })
    }

    /// Claims the producer side of this buffer.
    ///
    /// Returns `None` while another [`Producer`] for this buffer is alive.
    /// A new producer resumes after everything the previous one wrote.
    pub fn producer(self: &Arc<Self>) -> Option<Producer> {
        self.claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        let current = NonNull::new(self.parked.load(Ordering::Acquire))?;
        Some(Producer::new(Arc::clone(self), current))
    }

    /// Creates a buffer with its producer side already claimed.
    pub(crate) fn new_claimed(strings: Arc<StringTable>, chunk_size_bytes: usize) -> Producer {
        let buffer = Self::new(strings, chunk_size_bytes);
        buffer.claimed.store(true, Ordering::Relaxed);
        let head = buffer.head;
        Producer::new(buffer, head)
    }

    /// Hands the producer side back, parking its current chunk.
    fn release(&self, current: NonNull<Chunk>) {
        self.parked.store(current.as_ptr(), Ordering::Release);
        self.claimed.store(false, Ordering::Release);
    }

    /// Capacity of every chunk, in words.
    #[inline]
    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }

    /// The string table shared with the rest of the recorder.
    pub fn string_table(&self) -> &Arc<StringTable> {
        &self.strings
    }

    fn head(&self) -> &Chunk {
        // SAFETY: the head lives as long as the buffer.
        unsafe { self.head.as_ref() }
    }

    fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        std::iter::successors(Some(self.head()), |chunk| chunk.next())
    }

    /// Number of words published so far.
    pub fn published_words(&self) -> usize {
        self.chunks().map(Chunk::published_size).sum()
    }

    /// Number of chunks currently reachable from the head.
    pub fn chunk_count(&self) -> usize {
        self.chunks().count()
    }
}

impl Part for EventBuffer {
    fn populate_header(&self, header: &mut PartHeader) -> Result<()> {
        let length = self.published_words() * WORD_SIZE;
        *header = PartHeader::new(PART_TYPE_EVENTS, part_length(length)?);
        Ok(())
    }

    fn write_to(&self, header: &PartHeader, output: &mut OutputBuffer<'_>) -> Result<()> {
        let expected = header.length as usize / WORD_SIZE;
        if header.length as usize % WORD_SIZE != 0 {
            return Err(TraceError::EventLogMismatch {
                expected,
                available: self.published_words(),
            });
        }
        let mut remaining = expected;
        let mut chunk = Some(self.head());
        while remaining > 0 {
            let Some(current) = chunk else {
                return Err(TraceError::EventLogMismatch {
                    expected,
                    available: expected - remaining,
                });
            };
            let words = current.published_slots(remaining);
            output.append_words(words)?;
            remaining -= words.len();
            chunk = current.next();
        }
        output.align()
    }
}

impl Drop for EventBuffer {
    fn drop(&mut self) {
        let mut chunk = self.head.as_ptr();
        while !chunk.is_null() {
            // SAFETY: every chunk in the chain was leaked from a Box exactly
            // once, and no producer or reader outlives the buffer.
            let mut owned = unsafe { Box::from_raw(chunk) };
            chunk = owned.take_next();
        }
    }
}

impl Debug for EventBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuffer")
            .field("chunk_limit", &self.chunk_limit)
            .field("chunks", &self.chunk_count())
            .field("published_words", &self.published_words())
            .finish()
    }
}
