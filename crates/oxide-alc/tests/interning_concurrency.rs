//! Concurrent-caller invariants for the memory-manager interning cache
//! (SPEC_FULL §8), exercised with real OS threads in the style of
//! `arena_leak.rs`'s `test_global_arena_thread_safety`.

use oxide_alc::alc::Alc;
use oxide_alc::interning::get_for_alcs;
use oxide_alc::sentinel::ManagedHandle;
use std::sync::{Arc, Barrier};
use std::thread;

/// Many concurrent callers resolving the same ALC set must all observe the
/// same memory manager, whether or not they raced to create it.
#[test]
fn concurrent_callers_observe_the_same_manager() {
    let alcs: Vec<_> = (0..4)
        .map(|_| Alc::create_individual(ManagedHandle::None, true, None))
        .collect();

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let mut handles = Vec::with_capacity(threads);

    for _ in 0..threads {
        let alcs = alcs.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            get_for_alcs(&alcs)
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = &results[0];
    for mm in &results {
        assert!(Arc::ptr_eq(first, mm));
    }
}

/// A single ALC resolved concurrently from many threads must also converge
/// on one manager and populate the fast path exactly once, observably.
#[test]
fn concurrent_single_alc_resolution_converges() {
    let alc = Alc::create_individual(ManagedHandle::None, true, None);

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let mut handles = Vec::with_capacity(threads);

    for _ in 0..threads {
        let alc = alc.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            get_for_alcs(std::slice::from_ref(&alc))
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = &results[0];
    for mm in &results {
        assert!(Arc::ptr_eq(first, mm));
    }
    // A second resolution after the race must hit the fast path and still
    // agree with every racing caller.
    assert!(Arc::ptr_eq(first, &get_for_alcs(std::slice::from_ref(&alc))));
}

/// Many distinct ALC sets interned concurrently must never cross-
/// contaminate each other's cache bucket: every set must still resolve to
/// a manager whose membership matches exactly.
#[test]
fn distinct_sets_do_not_cross_contaminate() {
    let pool: Vec<_> = (0..32)
        .map(|_| Alc::create_individual(ManagedHandle::None, true, None))
        .collect();

    let mut handles = Vec::new();
    for i in 0..pool.len() - 1 {
        let set = vec![pool[i].clone(), pool[i + 1].clone()];
        handles.push(thread::spawn(move || {
            let mm = get_for_alcs(&set);
            (set, mm)
        }));
    }

    for handle in handles {
        let (set, mm) = handle.join().unwrap();
        let members = mm.generic_alcs();
        assert_eq!(members.len(), set.len());
        for alc in &set {
            assert!(members.iter().any(|m| Arc::ptr_eq(m, alc)));
        }
    }
}
