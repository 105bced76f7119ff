//! Lock-free append-only arena allocation for `OxideX`.
//!
//! This crate provides [`LockFreeArena`], a bump-pointer allocator over a
//! singly linked stack of chunks. It is the allocator of choice for any path
//! that must not take a lock: signal handlers, GC scans, profiler hooks, and
//! the memory manager's own lock-free fast paths.
//!
//! # Design Goals
//!
//! 1. **No blocking**: allocation either succeeds immediately or grows the
//!    arena by publishing a new chunk; it never waits on a lock.
//! 2. **Stable addresses**: once returned, a pointer is valid for the
//!    lifetime of the arena. Chunks are never moved or resized in place.
//! 3. **Safe publication**: a chunk is fully initialized before it becomes
//!    observable to other threads, ordered by a release/acquire pair.

pub mod arena;

pub use arena::{ArenaStats, LfaAllocError, LockFreeArena};
