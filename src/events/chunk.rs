//! One node of the event chain.

use std::cell::UnsafeCell;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Fixed-capacity block of event words, linked to its successor.
///
/// `size` and the slot contents belong to the producer while the chunk is
/// current. Readers only ever touch `slots[..published_size]`, and
/// `published_size` is stored once, with release ordering, right before
/// `next` is linked. A reader that acquires a non-null `next` therefore also
/// sees the final `published_size` and every slot below it.
pub(crate) struct Chunk {
    slots: Box<[UnsafeCell<u32>]>,
    size: UnsafeCell<usize>,
    published_size: CachePadded<AtomicUsize>,
    next: AtomicPtr<Chunk>,
}

impl Chunk {
    pub(crate) fn new(capacity: usize) -> Box<Self> {
        Box::new(Self {
            slots: (0..capacity).map(|_| UnsafeCell::new(0)).collect(),
            size: UnsafeCell::new(0),
            published_size: CachePadded::new(AtomicUsize::new(0)),
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn published_size(&self) -> usize {
        self.published_size.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn next(&self) -> Option<&Chunk> {
        // SAFETY: linked chunks are never freed before the owning buffer.
        unsafe { self.next.load(Ordering::Acquire).as_ref() }
    }

    /// Words made visible to readers, `len` capped at the published size.
    #[inline]
    pub(crate) fn published_slots(&self, len: usize) -> &[u32] {
        let len = len.min(self.published_size());
        // SAFETY: slots below the published size are frozen, and the acquire
        // load above synchronizes with the producer's release store.
        unsafe { std::slice::from_raw_parts(UnsafeCell::raw_get(self.slots.as_ptr()), len) }
    }

    /// Producer-side write cursor.
    ///
    /// # Safety
    ///
    /// Only the producer owning this chunk may call this.
    #[inline]
    pub(crate) unsafe fn size(&self) -> usize {
        *self.size.get()
    }

    /// Reserves `count` slots after the write cursor and advances it.
    ///
    /// # Safety
    ///
    /// Only the producer owning this chunk may call this, the chunk must not
    /// be published yet, and `size() + count` must not exceed the capacity.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub(crate) unsafe fn reserve(&self, count: usize) -> &mut [u32] {
        let start = *self.size.get();
        debug_assert!(start + count <= self.capacity());
        *self.size.get() = start + count;
        let base = UnsafeCell::raw_get(self.slots.as_ptr());
        std::slice::from_raw_parts_mut(base.add(start), count)
    }

    /// Freezes this chunk and links `successor`.
    ///
    /// # Safety
    ///
    /// Only the producer owning this chunk may call this, at most once.
    pub(crate) unsafe fn publish(&self, successor: NonNull<Chunk>) {
        self.published_size.store(*self.size.get(), Ordering::Release);
        self.next.store(successor.as_ptr(), Ordering::Release);
    }

    /// Detaches the successor link, for teardown.
    pub(crate) fn take_next(&mut self) -> *mut Chunk {
        std::mem::replace(self.next.get_mut(), ptr::null_mut())
    }
}

#[cfg(test)]
thread_local! {
    pub(crate) static DROPPED: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[cfg(test)]
impl Drop for Chunk {
    fn drop(&mut self) {
        DROPPED.with(|d| d.set(d.get() + 1));
    }
}
