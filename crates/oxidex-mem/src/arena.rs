//! A lock-free, append-only bump allocator over a chunked page stack.
//!
//! [`LockFreeArena`] never takes a lock. An allocation either lands in the
//! currently published chunk via an atomic fetch-and-bump of that chunk's
//! write cursor, or the arena grows: a fresh chunk is allocated off to the
//! side, linked behind the current head, and published with a release CAS.
//! Readers that already hold a returned pointer need no synchronization at
//! all; a chunk is only ever observed by other threads after it is fully
//! initialized.
//!
//! # Examples
//!
//! ```
//! use oxidex_mem::arena::LockFreeArena;
//!
//! let arena = LockFreeArena::new(64 * 1024);
//! let ptr = arena.alloc_zeroed(24);
//! unsafe {
//!     assert_eq!(*ptr.as_ptr(), 0);
//! }
//! ```

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Error returned when the backing system allocator cannot supply a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LfaAllocError;

impl std::fmt::Display for LfaAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lock-free arena: chunk allocation failed")
    }
}

impl std::error::Error for LfaAllocError {}

/// All arena allocations are rounded up to this boundary.
const DEFAULT_ALIGNMENT: usize = 8;

/// Smallest chunk the arena will ever allocate: one page.
const MIN_CHUNK_SIZE: usize = 4096;

/// Largest chunk size the doubling policy will reach on its own; a single
/// allocation request larger than this still gets a custom-sized chunk.
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Snapshot of arena usage, useful for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Total bytes handed out to callers so far.
    pub total_allocated: usize,
    /// Number of chunks currently linked into the arena.
    pub chunk_count: usize,
    /// Sum of the capacities of every chunk.
    pub total_capacity: usize,
}

/// A single page-aligned region with an atomically advanced write cursor.
///
/// Once linked into the arena's chunk stack, a chunk's `data` and `capacity`
/// never change; only `cursor` moves, and only forward.
struct Chunk {
    data: NonNull<u8>,
    capacity: usize,
    cursor: AtomicUsize,
    /// Link to the chunk that was current before this one was published.
    /// Null for the oldest chunk in the arena.
    prev: AtomicPtr<Chunk>,
}

// SAFETY: `data` is a heap allocation owned exclusively by this chunk and
// never aliased as a `&mut`; all mutation goes through atomics.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    fn new(size: usize) -> Result<*mut Chunk, LfaAllocError> {
        let layout = Layout::from_size_align(size, DEFAULT_ALIGNMENT).map_err(|_| LfaAllocError)?;
        // SAFETY: layout has non-zero size (callers never request size 0).
        let data = unsafe { alloc::alloc(layout) };
        let data = NonNull::new(data).ok_or(LfaAllocError)?;

        let chunk = Box::new(Chunk {
            data,
            capacity: size,
            cursor: AtomicUsize::new(0),
            prev: AtomicPtr::new(std::ptr::null_mut()),
        });
        Ok(Box::into_raw(chunk))
    }

    /// Reserves `size` bytes aligned to `align` from this chunk's remaining
    /// space via a CAS loop on the write cursor. Returns `None` if the chunk
    /// has no room left; the caller must not retry this chunk.
    #[inline]
    fn try_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let size_aligned = (size + align - 1) & !(align - 1);

        loop {
            let cur = self.cursor.load(Ordering::Acquire);
            let aligned_start = (cur + align - 1) & !(align - 1);
            let new_cur = aligned_start.checked_add(size_aligned)?;
            if new_cur > self.capacity {
                return None;
            }

            if self
                .cursor
                .compare_exchange_weak(cur, new_cur, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: aligned_start + size_aligned <= capacity, verified above.
                let ptr = unsafe { self.data.as_ptr().add(aligned_start) };
                return NonNull::new(ptr);
            }
        }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: layout matches the one used in `Chunk::new`.
        let layout = Layout::from_size_align(self.capacity, DEFAULT_ALIGNMENT).unwrap();
        unsafe { alloc::dealloc(self.data.as_ptr(), layout) };
    }
}

/// Lock-free append-only arena.
///
/// Every chunk, once published, is immutable past its write cursor; readers
/// that already hold a pointer into the arena never need to synchronize.
/// The only contended operations are the cursor CAS within a chunk and the
/// head CAS when a chunk fills up and a new one is published.
pub struct LockFreeArena {
    /// Current (most recently published) chunk; also the head of the
    /// singly linked chunk stack via each chunk's `prev` pointer.
    head: AtomicPtr<Chunk>,
    /// Size used for the next chunk grown by doubling, capped at
    /// `MAX_CHUNK_SIZE` unless a single request demands more.
    next_chunk_size: AtomicUsize,
    total_allocated: AtomicUsize,
    chunk_count: AtomicUsize,
}

unsafe impl Send for LockFreeArena {}
unsafe impl Sync for LockFreeArena {}

impl LockFreeArena {
    /// Creates a new arena whose first chunk is at least `chunk_size` bytes
    /// (rounded up to a page and to the next power of two).
    ///
    /// # Panics
    ///
    /// Panics if the very first chunk cannot be allocated; a freshly started
    /// arena that cannot get its first page is not recoverable.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        let size = chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two();
        let first = Chunk::new(size).expect("lock-free arena: failed to allocate first chunk");

        LockFreeArena {
            head: AtomicPtr::new(first),
            next_chunk_size: AtomicUsize::new((size * 2).min(MAX_CHUNK_SIZE)),
            total_allocated: AtomicUsize::new(0),
            chunk_count: AtomicUsize::new(1),
        }
    }

    /// Allocates `size` bytes of zeroed memory. Never blocks: on chunk
    /// exhaustion it grows the arena by publishing a new chunk and retries.
    ///
    /// # Panics
    ///
    /// Panics if the system allocator cannot supply a new chunk; allocation
    /// failure at this layer is treated as unrecoverable (see crate-level
    /// error handling design: mempool/LFA allocation is infallible here).
    #[must_use]
    pub fn alloc_zeroed(&self, size: usize) -> NonNull<u8> {
        let size = (size + DEFAULT_ALIGNMENT - 1) & !(DEFAULT_ALIGNMENT - 1);

        loop {
            let current = self.head.load(Ordering::Acquire);
            // SAFETY: current is always a live chunk published by `new` or `grow`.
            let chunk = unsafe { &*current };

            if let Some(ptr) = chunk.try_alloc(size, DEFAULT_ALIGNMENT) {
                // SAFETY: ptr references `size` fresh bytes just reserved from
                // this chunk and not yet handed to any other caller.
                unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, size) };
                self.total_allocated.fetch_add(size, Ordering::Relaxed);
                return ptr;
            }

            self.grow(current, size);
        }
    }

    /// Publishes a new chunk large enough for `min_size`, linked behind
    /// whichever chunk is current at publish time.
    #[cold]
    fn grow(&self, observed_head: *mut Chunk, min_size: usize) {
        if self.head.load(Ordering::Acquire) != observed_head {
            // Another thread already published a replacement; let the
            // caller retry against it instead of growing twice.
            return;
        }

        let base = self.next_chunk_size.load(Ordering::Relaxed);
        let new_size = base.max(min_size).next_power_of_two();
        let new_chunk =
            Chunk::new(new_size).expect("lock-free arena: failed to allocate chunk");

        // SAFETY: new_chunk was just created by this thread and is not yet
        // reachable from `head`; no other thread can observe it.
        unsafe { (*new_chunk).prev = AtomicPtr::new(observed_head) };

        match self.head.compare_exchange(
            observed_head,
            new_chunk,
            Ordering::Release,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.chunk_count.fetch_add(1, Ordering::Relaxed);
                self.next_chunk_size
                    .store((new_size * 2).min(MAX_CHUNK_SIZE), Ordering::Relaxed);
            }
            Err(_) => {
                // Lost the race to publish; drop our redundant chunk rather
                // than leaving it dangling off the stack unreferenced.
                // SAFETY: new_chunk has no other owner; it was never linked
                // into `head` (the CAS failed).
                unsafe { drop(Box::from_raw(new_chunk)) };
            }
        }
    }

    /// Returns a snapshot of arena usage by walking the chunk stack.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let mut chunk_count = 0usize;
        let mut total_capacity = 0usize;
        let mut current = self.head.load(Ordering::Acquire);
        while !current.is_null() {
            // SAFETY: every chunk reachable from `head` stays alive for the
            // lifetime of the arena; capacity/prev are read-only after init.
            let chunk = unsafe { &*current };
            chunk_count += 1;
            total_capacity += chunk.capacity;
            current = chunk.prev.load(Ordering::Acquire);
        }

        ArenaStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            chunk_count,
            total_capacity,
        }
    }
}

impl Drop for LockFreeArena {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            // SAFETY: each chunk in the stack was allocated via `Box::into_raw`
            // in `Chunk::new` and is freed here exactly once.
            let mut chunk = unsafe { Box::from_raw(current) };
            current = *chunk.prev.get_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn alloc_zeroed_is_zeroed() {
        let arena = LockFreeArena::new(4096);
        let ptr = arena.alloc_zeroed(32);
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 32) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn sequential_allocations_do_not_overlap() {
        let arena = LockFreeArena::new(4096);
        let mut ranges = Vec::new();
        for _ in 0..64 {
            let ptr = arena.alloc_zeroed(24);
            let start = ptr.as_ptr() as usize;
            ranges.push((start, start + 24));
        }
        for i in 0..ranges.len() {
            for j in (i + 1)..ranges.len() {
                let (a0, a1) = ranges[i];
                let (b0, b1) = ranges[j];
                assert!(a1 <= b0 || b1 <= a0, "overlapping allocations");
            }
        }
    }

    #[test]
    fn allocation_filling_chunk_exactly_succeeds_then_grows() {
        let arena = LockFreeArena::new(MIN_CHUNK_SIZE);
        let first_stats = arena.stats();
        assert_eq!(first_stats.chunk_count, 1);

        // Consume (almost) the entire first chunk.
        let _ = arena.alloc_zeroed(MIN_CHUNK_SIZE - DEFAULT_ALIGNMENT);
        let mid_stats = arena.stats();
        assert_eq!(mid_stats.chunk_count, 1);

        // This allocation cannot fit; the arena must grow.
        let _ = arena.alloc_zeroed(64);
        let grown_stats = arena.stats();
        assert_eq!(grown_stats.chunk_count, 2);
    }

    #[test]
    fn concurrent_allocation_from_many_threads_is_disjoint() {
        let arena = Arc::new(LockFreeArena::new(8192));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let arena = Arc::clone(&arena);
            handles.push(thread::spawn(move || {
                let mut ptrs = Vec::with_capacity(1000);
                for _ in 0..1000 {
                    ptrs.push(arena.alloc_zeroed(24).as_ptr() as usize);
                }
                ptrs
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        all.sort_unstable();
        let before = all.len();
        all.dedup();
        assert_eq!(before, all.len(), "two threads observed the same address");
    }

    #[test]
    fn stats_report_growth() {
        let arena = LockFreeArena::new(4096);
        for _ in 0..2000 {
            let _ = arena.alloc_zeroed(64);
        }
        let stats = arena.stats();
        assert!(stats.chunk_count > 1);
        assert!(stats.total_capacity >= stats.total_allocated);
    }
}
