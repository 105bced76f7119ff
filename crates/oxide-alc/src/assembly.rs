//! The assembly data model (SPEC_FULL §3 SUPPLEMENT).
//!
//! The spec's distillation treats "assembly" as an opaque unit an ALC
//! loads and later tears down; it never says what one carries. The
//! original source's cleanup pass (`mono_alc_cleanup`) needs exactly three
//! things from each one: whether it is dynamic (reflection-emitted,
//! torn down before anything else), a shared refcount (jointly held by the
//! owning ALC and the root domain), and a way to release whatever GC roots
//! it registered. `Assembly` supplies those without modeling the rest of
//! assembly metadata, which belongs to the out-of-scope metadata loader.

use crate::Alc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

pub struct Assembly {
    pub name: String,
    pub dynamic: bool,
    refcount: AtomicU32,
    gc_roots_released: AtomicBool,
    owner: Weak<Alc>,
}

impl Assembly {
    /// Starts the refcount at 2: one reference for the owning ALC, one for
    /// the root domain's own tracking list. Both must let go before the
    /// assembly is considered closed.
    pub fn new(name: impl Into<String>, dynamic: bool, owner: Weak<Alc>) -> Arc<Self> {
        Arc::new(Assembly {
            name: name.into(),
            dynamic,
            refcount: AtomicU32::new(2),
            gc_roots_released: AtomicBool::new(false),
            owner,
        })
    }

    pub fn owning_alc(&self) -> Option<Arc<Alc>> {
        self.owner.upgrade()
    }

    pub fn release_gc_roots(&self) {
        self.gc_roots_released.store(true, Ordering::Release);
    }

    pub fn gc_roots_released(&self) -> bool {
        self.gc_roots_released.load(Ordering::Acquire)
    }

    /// Drops one of the two joint references. Returns `true` if this was
    /// the last one, meaning the assembly is now fully closed.
    pub fn release_reference(&self) -> bool {
        self.refcount.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// First or second close pass of `cleanup_assemblies` (SPEC_FULL §4.4):
    /// releases the owning ALC's share of the refcount. Returns whether
    /// this was the release that finished the assembly.
    pub fn close_except_image_pools(&self) -> bool {
        let finished = self.release_reference();
        oxidex_log::trace!(
            "assembly '{}' close_except_image_pools (dynamic={}, finished={})",
            self.name,
            self.dynamic,
            finished
        );
        finished
    }

    /// Final teardown step for an assembly that survived both the dynamic
    /// and non-dynamic close passes without reaching a zero refcount
    /// (still externally referenced, e.g. by a generic memory manager's
    /// reflection cache).
    pub fn close_finish(&self) {
        oxidex_log::debug!(
            "assembly '{}' close_finish (dynamic={}, gc_roots_released={})",
            self.name,
            self.dynamic,
            self.gc_roots_released()
        );
    }
}
