//! The memory manager (SPEC_FULL §4.2): the allocation and metadata-cache
//! unit backing either a single ALC (singleton) or a set of ALCs sharing
//! generic-instantiation state (generic).
//!
//! Everything that is not the lock-free arena or the mempool lives behind
//! one lock (`state: CoopLock<MmState>`), mirroring the "MM main lock"
//! level in SPEC_FULL §5: the reflection caches, the vtable array, the
//! loader-allocator sentinel handles, a generic MM's member-ALC list, and
//! the code arena's region bookkeeping all share it.

use crate::alc::Alc;
use crate::config;
use crate::coop_lock::CoopLock;
use crate::error::{Error, Result};
use crate::pools::{CodeArenaState, CodeRegion, Mempool};
use crate::sentinel::{Sentinel, StrongHandle, WeakHandle};
use crate::{AlcHandle, MmHandle};
use oxidex_mem::LockFreeArena;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

const DEFAULT_LFA_CHUNK: usize = 1 << 16;

/// Process-wide loader-bytes counter: total mempool bytes currently
/// allocated across every live memory manager. Only maintained when
/// `RuntimeConfig::perf_counters` is enabled; reads `0` otherwise.
static LOADER_BYTES: AtomicI64 = AtomicI64::new(0);

/// Current value of the loader-bytes counter. Exposed for perf-counter
/// plumbing and tests.
pub fn loader_bytes() -> i64 {
    LOADER_BYTES.load(Ordering::Relaxed)
}

/// A cached vtable for some managed type loaded into this memory manager.
/// Real vtables carry a great deal more (interface maps, static field
/// storage); this subsystem only needs to know one exists and whether it
/// has registered GC roots, which is all `delete_objects` must act on.
#[derive(Debug, Clone)]
pub struct VTableEntry {
    pub type_name: String,
    pub gc_root_registered: bool,
}

/// State shared under the MM main lock (SPEC_FULL §5 level 5). The lock is
/// reentrant (see `coop_lock.rs`), so `CoopLockGuard` only ever hands out
/// `&MmState`; every field here carries its own interior mutability cell
/// and enforces its own exclusivity, which is what actually makes nested
/// reacquisition on one thread sound.
struct MmState {
    freeing: Cell<bool>,
    frozen: Cell<bool>,
    reflection_type_hash: RefCell<HashMap<String, usize>>,
    reflection_object_hash: RefCell<HashMap<usize, usize>>,
    type_init_exception_hash: RefCell<HashMap<String, String>>,
    vtable_array: RefCell<Vec<VTableEntry>>,
    strong_handle: RefCell<Option<StrongHandle>>,
    weak_handle: RefCell<Option<WeakHandle>>,
    debug_info: RefCell<Option<String>>,
    /// Only meaningful when the owning `MemoryManager` is generic.
    generic_alcs: RefCell<Vec<AlcHandle>>,
    code: RefCell<CodeArenaState>,
}

impl Default for MmState {
    fn default() -> Self {
        MmState {
            freeing: Cell::new(false),
            frozen: Cell::new(false),
            reflection_type_hash: RefCell::new(HashMap::new()),
            reflection_object_hash: RefCell::new(HashMap::new()),
            type_init_exception_hash: RefCell::new(HashMap::new()),
            vtable_array: RefCell::new(Vec::new()),
            strong_handle: RefCell::new(None),
            weak_handle: RefCell::new(None),
            debug_info: RefCell::new(None),
            generic_alcs: RefCell::new(Vec::new()),
            code: RefCell::new(CodeArenaState::default()),
        }
    }
}

enum Owner {
    /// Back-pointer is weak: the singleton MM must not keep its own ALC
    /// alive, since ownership flows the other way (the ALC owns its
    /// singleton MM).
    Singleton(Weak<Alc>),
    Generic,
}

pub struct MemoryManager {
    owner: Owner,
    collectible: bool,
    mempool: Mempool,
    lfa: LockFreeArena,
    state: CoopLock<MmState>,
}

impl MemoryManager {
    pub(crate) fn create_singleton(owner: Weak<Alc>, collectible: bool) -> MmHandle {
        Arc::new(MemoryManager {
            owner: Owner::Singleton(owner),
            collectible,
            mempool: Mempool::new(4096),
            lfa: LockFreeArena::new(DEFAULT_LFA_CHUNK),
            state: CoopLock::new(MmState::default()),
        })
    }

    pub fn create_generic(alcs: Vec<AlcHandle>) -> MmHandle {
        let collectible = alcs.iter().all(|a| a.is_collectible());
        let state = MmState {
            generic_alcs: RefCell::new(dedup_by_ptr(alcs)),
            ..MmState::default()
        };
        Arc::new(MemoryManager {
            owner: Owner::Generic,
            collectible,
            mempool: Mempool::new(4096),
            lfa: LockFreeArena::new(DEFAULT_LFA_CHUNK),
            state: CoopLock::new(state),
        })
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.owner, Owner::Generic)
    }

    pub fn is_collectible(&self) -> bool {
        self.collectible
    }

    pub fn owning_alc(&self) -> Option<AlcHandle> {
        match &self.owner {
            Owner::Singleton(weak) => weak.upgrade(),
            Owner::Generic => None,
        }
    }

    pub fn generic_alcs(&self) -> Vec<AlcHandle> {
        self.state.lock().generic_alcs.borrow().clone()
    }

    /// Removes `alc` from this generic MM's member set. Returns the number
    /// of members left afterward.
    pub(crate) fn remove_generic_alc(&self, alc: &AlcHandle) -> usize {
        let state = self.state.lock();
        let mut generic_alcs = state.generic_alcs.borrow_mut();
        generic_alcs.retain(|a| !Arc::ptr_eq(a, alc));
        generic_alcs.len()
    }

    pub fn is_frozen(&self) -> bool {
        self.state.lock().frozen.get()
    }

    pub fn is_freeing(&self) -> bool {
        self.state.lock().freeing.get()
    }

    pub fn set_debug_info(&self, info: impl Into<String>) {
        *self.state.lock().debug_info.borrow_mut() = Some(info.into());
    }

    pub fn debug_info(&self) -> Option<String> {
        self.state.lock().debug_info.borrow().clone()
    }

    // -- allocation APIs (§4.2) -----------------------------------------

    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>> {
        if self.is_frozen() {
            return Err(Error::MemoryManagerFrozen);
        }
        let ptr = self.mempool.alloc_zeroed(size);
        if config::get().perf_counters {
            LOADER_BYTES.fetch_add(size as i64, Ordering::Relaxed);
        }
        Ok(ptr)
    }

    pub fn strdup(&self, s: &str) -> Result<NonNull<u8>> {
        if self.is_frozen() {
            return Err(Error::MemoryManagerFrozen);
        }
        let ptr = self.mempool.strdup(s);
        if config::get().perf_counters {
            LOADER_BYTES.fetch_add((s.len() + 1) as i64, Ordering::Relaxed);
        }
        Ok(ptr)
    }

    pub fn mp_contains(&self, addr: usize) -> bool {
        self.mempool.contains(addr)
    }

    /// Allocates from the lock-free arena. Never blocks, including when
    /// the manager is frozen — callers relying on lock-free allocation
    /// must check `is_frozen` themselves if they care.
    pub fn alloc_lock_free(&self, size: usize) -> NonNull<u8> {
        self.lfa.alloc_zeroed(size)
    }

    pub fn code_reserve(&self, size: usize, align: usize) -> Result<NonNull<u8>> {
        if self.is_frozen() {
            return Err(Error::MemoryManagerFrozen);
        }
        Ok(self.state.lock().code.borrow_mut().reserve(size, align))
    }

    pub fn code_commit(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::MemoryManagerFrozen);
        }
        if self.state.lock().code.borrow_mut().commit(ptr, old_size, new_size) {
            Ok(())
        } else {
            Err(Error::InvalidCodeCommit)
        }
    }

    /// Iterates every committed code region. The callback must not call
    /// `code_reserve`/`code_commit` on this memory manager: `code` is
    /// already borrowed for the duration of the iteration, and those calls
    /// need a mutable borrow of the same cell, which panics.
    pub fn code_foreach(&self, mut f: impl FnMut(&CodeRegion)) {
        self.state.lock().code.borrow().foreach(|r| f(r));
    }

    // -- loader-allocator sentinel (§4.2, §4.4) --------------------------

    /// Lazily realizes the loader-allocator sentinel for a collectible
    /// memory manager and returns a weak handle to it. Non-collectible
    /// managers have no sentinel and always return `None`.
    pub fn get_loader_alloc(&self) -> Option<WeakHandle> {
        if !self.collectible {
            return None;
        }
        {
            let state = self.state.lock();
            if let Some(weak) = state.weak_handle.borrow().as_ref() {
                return Some(weak.clone());
            }
        }
        let strong: StrongHandle = Arc::new(Sentinel::new());
        let state = self.state.lock();
        if let Some(weak) = state.weak_handle.borrow().as_ref() {
            // Another caller won the race while we built a redundant one.
            return Some(weak.clone());
        }
        let weak = Arc::downgrade(&strong);
        *state.strong_handle.borrow_mut() = Some(strong);
        *state.weak_handle.borrow_mut() = Some(weak.clone());
        Some(weak)
    }

    pub fn weak_handle(&self) -> Option<WeakHandle> {
        self.state.lock().weak_handle.borrow().clone()
    }

    /// Releases this memory manager's own strong hold on its sentinel, the
    /// last step before the sentinel can become unreachable (§4.4 step 3).
    pub fn release_strong_handle(&self) {
        *self.state.lock().strong_handle.borrow_mut() = None;
    }

    // -- two-phase deletion (§4.4) ----------------------------------------

    /// Phase one: drop the object-level caches a collected type or object
    /// could still be observed through. Idempotent.
    pub fn delete_objects(&self) {
        let state = self.state.lock();
        if state.freeing.get() {
            return;
        }
        state.freeing.set(true);
        state.reflection_type_hash.borrow_mut().clear();
        state.reflection_object_hash.borrow_mut().clear();
        state.type_init_exception_hash.borrow_mut().clear();
        state.vtable_array.borrow_mut().clear();
        oxidex_log::debug!("memory manager object caches cleared");
    }

    /// Phase two: release the backing allocators, unless `debug_unload` is
    /// configured, in which case the manager is frozen instead so a
    /// post-mortem debugger can still inspect it.
    pub fn delete(&self) {
        self.delete_objects();
        if config::get().debug_unload {
            self.state.lock().frozen.set(true);
            oxidex_log::debug!("memory manager retained frozen for post-mortem inspection");
            return;
        }
        if config::get().perf_counters {
            LOADER_BYTES.fetch_sub(self.mempool.total_allocated() as i64, Ordering::Relaxed);
        }
        self.mempool.reset();
        let state = self.state.lock();
        state.code.borrow_mut().clear();
        state.frozen.set(true);
        oxidex_log::debug!("memory manager backing storage released");
    }
}

pub(crate) fn dedup_by_ptr(alcs: Vec<AlcHandle>) -> Vec<AlcHandle> {
    let mut result: Vec<AlcHandle> = Vec::with_capacity(alcs.len());
    for a in alcs {
        if !result.iter().any(|x| Arc::ptr_eq(x, &a)) {
            result.push(a);
        }
    }
    result
}
