//! A reentrant mutex standing in for the "coop" (cooperative-suspension
//! aware) recursive lock that guards a memory manager's main state
//! (SPEC_FULL §5, lock level 5). The same thread may acquire it again
//! without deadlocking, which reflection cache lookups rely on when they
//! recurse back into the owning memory manager.
//!
//! A reentrant lock can only soundly hand out shared access: if it handed
//! out `&mut T` the way a non-reentrant `MutexGuard` does, two nested
//! guards held by the same thread would produce two live `&mut T` aliasing
//! the same data, which is undefined behavior regardless of whether the
//! recursive call actually touches the same field. `CoopLockGuard`
//! therefore only derefs to `&T`; callers needing to mutate put the
//! mutable fields behind their own interior-mutability cells (`Cell`,
//! `RefCell`) and borrow those explicitly, the same split
//! `std::sync::ReentrantLock` makes for the same reason.
//!
//! No analogue for this exists elsewhere in the corpus; it is written in
//! the corpus's general idiom for small synchronization primitives layered
//! over `std::sync` rather than adapted from a specific file.

use std::cell::UnsafeCell;
use std::ops::Deref;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
}

pub struct CoopLock<T> {
    inner: UnsafeCell<T>,
    state: Mutex<LockState>,
    released: Condvar,
}

unsafe impl<T: Send> Send for CoopLock<T> {}
unsafe impl<T: Send> Sync for CoopLock<T> {}

impl<T> CoopLock<T> {
    pub fn new(value: T) -> Self {
        CoopLock {
            inner: UnsafeCell::new(value),
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Acquires the lock, blocking the calling thread if another thread
    /// holds it. A thread that already holds the lock reenters it.
    pub fn lock(&self) -> CoopLockGuard<'_, T> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        loop {
            match state.owner {
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(_) => {
                    state = self.released.wait(state).unwrap();
                }
            }
        }
        CoopLockGuard { lock: self }
    }
}

pub struct CoopLockGuard<'a, T> {
    lock: &'a CoopLock<T>,
}

impl<T> Deref for CoopLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard's existence proves the calling thread holds the
        // lock (possibly reentrantly). Only shared references are ever
        // handed out (no `DerefMut`), so arbitrarily many live guards on
        // the same thread never alias a `&mut T` against this borrow or
        // each other; mutation happens only through `T`'s own interior
        // mutability cells, which enforce exclusivity themselves.
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> Drop for CoopLockGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().unwrap();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.lock.released.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn reentrant_lock_does_not_deadlock() {
        let lock = CoopLock::new(Cell::new(0u32));
        let outer = lock.lock();
        assert_eq!(outer.get(), 0);
        {
            let inner = lock.lock();
            inner.set(inner.get() + 1);
        }
        assert_eq!(outer.get(), 1);
    }

    #[test]
    fn excludes_other_threads() {
        let lock = Arc::new(CoopLock::new(Cell::new(0u64)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let guard = lock.lock();
                    guard.set(guard.get() + 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.lock().get(), 8000);
    }
}
