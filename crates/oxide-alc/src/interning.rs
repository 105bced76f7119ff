//! The memory-manager interning cache (SPEC_FULL §4.3): given a set of
//! ALCs, returns the unique generic memory manager representing that set.
//!
//! Three layers, fastest (and least authoritative) first: a per-ALC
//! lock-free fast-path pointer for the single-ALC case, a fixed-size
//! single-slot-per-bucket hashed cache, and the authoritative per-ALC
//! `generic_memory_managers` list. The first two may racefully miss but
//! never lie — set-equality is checked exactly before trusting either.

use crate::config;
use crate::memory_manager::{dedup_by_ptr, MemoryManager};
use crate::registry;
use crate::{AlcHandle, MmHandle};
use arc_swap::ArcSwapOption;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

const CACHE_BUCKETS: usize = 256;

static CACHE: OnceLock<Vec<ArcSwapOption<MemoryManager>>> = OnceLock::new();
static CACHE_HITS: AtomicU64 = AtomicU64::new(0);

fn cache_buckets() -> &'static [ArcSwapOption<MemoryManager>] {
    CACHE.get_or_init(|| (0..CACHE_BUCKETS).map(|_| ArcSwapOption::from(None)).collect())
}

/// Number of times the hashed bucket cache (§4.3 step 3) produced a hit.
/// Exposed for tests and perf-counter plumbing.
pub fn cache_hit_count() -> u64 {
    CACHE_HITS.load(Ordering::Relaxed)
}

fn mix_ptr(alc: &AlcHandle) -> u64 {
    let addr = Arc::as_ptr(alc) as usize;
    let mut hasher = fxhash::FxHasher::default();
    addr.hash(&mut hasher);
    hasher.finish()
}

/// Order-independent hash over an ALC set: sum of each member's mixed
/// pointer hash, so permutations of the same set collide to the same
/// bucket (SPEC_FULL §3 "ALC-set key").
fn hash_set(alcs: &[AlcHandle]) -> u64 {
    alcs.iter().fold(0u64, |acc, a| acc.wrapping_add(mix_ptr(a)))
}

/// Set-equality: same cardinality, every element of `a` present in `b`.
/// Both `a` and `b` are assumed already deduplicated.
fn set_equal(a: &[AlcHandle], b: &[AlcHandle]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| Arc::ptr_eq(x, y)))
}

fn alcs_of(mm: &MmHandle) -> Vec<AlcHandle> {
    if mm.is_generic() {
        mm.generic_alcs()
    } else {
        vec![mm
            .owning_alc()
            .expect("singleton memory manager always has an owning ALC")]
    }
}

/// `get_for_alcs` (SPEC_FULL §4.3): resolve a set of ALCs to the unique
/// generic memory manager representing it, creating one if none exists
/// yet.
pub fn get_for_alcs(alcs: &[AlcHandle]) -> MmHandle {
    let set = dedup_by_ptr(alcs.to_vec());

    // Step 1: the empty set substitutes the default ALC.
    if set.is_empty() {
        return get_for_alcs(&[registry::default_alc()]);
    }

    // Step 2: per-ALC lock-free fast path, single-member sets only.
    if set.len() == 1 {
        if let Some(mm) = set[0].fastpath().load_full() {
            return mm;
        }
    }

    // Step 3: hashed single-slot-per-bucket cache.
    let hash = hash_set(&set);
    let buckets = cache_buckets();
    let bucket = &buckets[(hash as usize) % CACHE_BUCKETS];
    if let Some(mm) = bucket.load_full() {
        if set_equal(&alcs_of(&mm), &set) {
            if config::get().perf_counters {
                CACHE_HITS.fetch_add(1, Ordering::Relaxed);
            }
            return mm;
        }
    }

    // Steps 4-5: authoritative per-ALC list lookup and create-and-register,
    // performed under one held lock on the anchor ALC's list. Any member
    // ALC's list is sufficient to search since every generic MM is
    // registered with all of its members, and holding the anchor's lock
    // across both the search and the insert is what makes this a proper
    // double-checked insert: a second caller racing to resolve the same
    // novel set blocks on this lock and then finds the first caller's MM
    // already registered, instead of also falling through to create one.
    let anchor = &set[0];
    let mm = {
        let mut anchor_list = anchor.generic_memory_managers().lock().unwrap();
        if let Some(mm) = anchor_list.iter().find(|mm| set_equal(&mm.generic_alcs(), &set)) {
            mm.clone()
        } else {
            let mm = MemoryManager::create_generic(set.clone());
            anchor_list.push(mm.clone());
            mm
        }
    };

    // Register with the remaining members in pointer-sorted order, so
    // concurrent insertions of overlapping sets always acquire per-ALC
    // locks in the same relative order.
    let mut others: Vec<&AlcHandle> = set.iter().filter(|a| !Arc::ptr_eq(a, anchor)).collect();
    others.sort_by_key(|a| Arc::as_ptr(a) as usize);
    for alc in others {
        let mut list = alc.generic_memory_managers().lock().unwrap();
        if !list.iter().any(|m| Arc::ptr_eq(m, &mm)) {
            list.push(mm.clone());
        }
    }

    bucket.store(Some(mm.clone()));
    if set.len() == 1 {
        set[0].fastpath().store(Some(mm.clone()));
    }

    oxidex_log::debug!(
        "interned new generic memory manager over {} ALC(s)",
        set.len()
    );
    mm
}

/// `merge` (SPEC_FULL §4.3): resolves the union of two memory managers'
/// ALC sets to a single generic memory manager.
pub fn merge(a: &MmHandle, b: &MmHandle) -> MmHandle {
    let mut combined = alcs_of(a);
    combined.extend(alcs_of(b));
    get_for_alcs(&combined)
}
