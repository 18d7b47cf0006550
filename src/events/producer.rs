//! Producer side of an [`EventBuffer`].

use std::fmt::{self, Debug};
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::trace;

use super::chunk::Chunk;
use super::EventBuffer;
use crate::error::{Result, TraceError};

/// Exclusive write handle of an [`EventBuffer`].
///
/// There is at most one `Producer` per buffer at any time, which is what lets
/// the write path run without synchronization. The handle can be moved to
/// another thread but not shared.
///
/// Words appended to the current chunk stay invisible to flushes until the
/// chunk is published: when it fills up, on [`publish`], or when the
/// producer is dropped.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use tracciato::events::EventBuffer;
/// use tracciato::strings::StringTable;
///
/// let buffer = EventBuffer::new(Arc::new(StringTable::new()), 4096);
/// let mut producer = buffer.producer().unwrap();
///
/// let handle = thread::spawn(move || {
///     let name = producer.intern("tick").unwrap();
///     for i in 0..10_000 {
///         producer.append(&[name, i]).unwrap();
///     }
/// });
///
/// handle.join().unwrap();
/// assert_eq!(buffer.published_words(), 20_000);
/// ```
///
/// [`publish`]: Producer::publish
pub struct Producer {
    buffer: Arc<EventBuffer>,
    current: NonNull<Chunk>,
}

// SAFETY: the producer owns the write side of its current chunk exclusively;
// moving it to another thread moves that ownership along.
unsafe impl Send for Producer {}

impl Producer {
    pub(super) fn new(buffer: Arc<EventBuffer>, current: NonNull<Chunk>) -> Self {
        Self { buffer, current }
    }

    /// The buffer this producer writes to.
    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    #[inline]
    fn current<'a>(&self) -> &'a Chunk {
        // SAFETY: chunks outlive the Arc<EventBuffer> held by this producer.
        unsafe { &*self.current.as_ptr() }
    }

    /// Words written to the current chunk that are not published yet.
    pub fn pending_words(&self) -> usize {
        // SAFETY: we are the producer.
        unsafe { self.current().size() }
    }

    /// Reserves `count` slots for one record and returns them for writing.
    ///
    /// The record always lands in a single chunk: if the current chunk
    /// cannot hold it, a new one is started via [`expand_and_add_slots`].
    ///
    /// [`expand_and_add_slots`]: Producer::expand_and_add_slots
    #[inline]
    pub fn add_slots(&mut self, count: usize) -> Result<&mut [u32]> {
        let chunk = self.current();
        // SAFETY: we are the producer and the current chunk is unpublished.
        unsafe {
            if chunk.size() + count <= chunk.capacity() {
                return Ok(chunk.reserve(count));
            }
        }
        self.expand_and_add_slots(count)
    }

    /// Appends one record.
    #[inline]
    pub fn append(&mut self, words: &[u32]) -> Result<()> {
        self.add_slots(words.len())?.copy_from_slice(words);
        Ok(())
    }

    /// Publishes the current chunk and continues in a new one with `count`
    /// slots already reserved.
    ///
    /// Fails with [`TraceError::RecordTooLarge`] if `count` exceeds the
    /// chunk capacity.
    pub fn expand_and_add_slots(&mut self, count: usize) -> Result<&mut [u32]> {
        let capacity = self.buffer.chunk_limit();
        if count > capacity {
            return Err(TraceError::RecordTooLarge {
                requested: count,
                capacity,
            });
        }
        let chunk = self.link_new_chunk();
        // SAFETY: the new chunk is empty, unpublished and ours.
        Ok(unsafe { chunk.reserve(count) })
    }

    /// Makes every word appended so far visible to flushes.
    ///
    /// Does nothing if the current chunk is empty.
    pub fn publish(&mut self) {
        if self.pending_words() > 0 {
            self.link_new_chunk();
        }
    }

    /// Returns the id of `value` in the shared string table.
    pub fn intern(&self, value: &str) -> Result<u32> {
        self.buffer.string_table().get_string_id(value)
    }

    fn link_new_chunk<'a>(&mut self) -> &'a Chunk {
        let old = self.current();
        let new = NonNull::from(Box::leak(Chunk::new(self.buffer.chunk_limit())));
        // SAFETY: we are the producer and `old` is published exactly once,
        // here, when it stops being current.
        unsafe {
            trace!(words = old.size(), "chunk published");
            old.publish(new);
        }
        self.current = new;
        self.current()
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.publish();
        self.buffer.release(self.current);
    }
}

impl Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("pending_words", &self.pending_words())
            .field("chunk_limit", &self.buffer.chunk_limit())
            .finish()
    }
}
