//! End-to-end lifecycle scenarios (SPEC_FULL §8), exercised through the
//! crate's public API only. A collectible ALC's managed sentinel stands in
//! for the GC's real weak/strong handle contract, since the garbage
//! collector itself is out of scope (SPEC_FULL §1).

use oxide_alc::alc::Alc;
use oxide_alc::error::Error;
use oxide_alc::interning::{get_for_alcs, merge};
use oxide_alc::registry;
use oxide_alc::resolve;
use oxide_alc::sentinel::{ManagedHandle, Sentinel};
use oxide_alc::unload;
use std::sync::Arc;

/// Scenario 1: a collectible ALC with one assembly, prepared for unload,
/// whose sentinel drops to zero references — the scout must finalize it
/// and remove it from the registry.
#[test]
fn collectible_alc_unloads_end_to_end() {
    let alc = Alc::create_individual(ManagedHandle::None, true, None);
    alc.load_assembly("One.Assembly", false).unwrap();

    let mm = alc.singleton_mm();
    let weak = mm.get_loader_alloc().unwrap();

    let strong = Arc::new(Sentinel::new());
    alc.prepare_unload(strong.clone()).unwrap();
    assert!(alc.is_unloading());

    // Drop every managed reference: our own strong handle, and the
    // internal strong handle prepare_unload already released.
    drop(strong);
    assert!(weak.upgrade().is_none());

    assert!(unload::scout(&mm, &weak));
    assert!(!registry::registry().all().iter().any(|a| Arc::ptr_eq(a, &alc)));
}

/// Scenario 2: two collectible ALCs share a generic memory manager. The
/// manager survives as long as either member is referenced, and
/// permutation order does not affect which manager is returned.
#[test]
fn generic_mm_survives_partial_unload() {
    let a = Alc::create_individual(ManagedHandle::None, true, None);
    let b = Alc::create_individual(ManagedHandle::None, true, None);

    let mm = get_for_alcs(&[a.clone(), b.clone()]);
    let same = get_for_alcs(&[b.clone(), a.clone()]);
    assert!(Arc::ptr_eq(&mm, &same));

    let weak = mm.get_loader_alloc().unwrap();

    let strong_a = Arc::new(Sentinel::new());
    a.prepare_unload(strong_a.clone()).unwrap();
    drop(strong_a);

    // `mm`'s only strong sentinel reference was released by `a`'s
    // prepare_unload, but `b` has not unloaded yet, so finalize must not
    // be attempted: it is still reachable and usable through `b`'s
    // membership.
    assert!(weak.upgrade().is_none());
    assert!(mm.generic_alcs().iter().any(|m| Arc::ptr_eq(m, &b)));
    assert!(mm.alloc(16).is_ok());

    let strong_b = Arc::new(Sentinel::new());
    b.prepare_unload(strong_b.clone()).unwrap();
    drop(strong_b);

    assert!(unload::scout(&mm, &weak));
    assert!(mm.generic_alcs().is_empty());
}

/// Scenario 4: cleanup closes dynamic assemblies before non-dynamic ones,
/// and every assembly gets exactly one `close_finish` regardless of order.
#[test]
fn cleanup_assemblies_orders_dynamic_before_static() {
    let alc = Alc::create_individual(ManagedHandle::None, true, None);
    let dynamic = alc.load_assembly("Dynamic.Asm", true).unwrap();
    let static_asm = alc.load_assembly("Static.Asm", false).unwrap();

    let mm = alc.singleton_mm();
    let weak = mm.weak_handle().unwrap();

    let strong = Arc::new(Sentinel::new());
    alc.prepare_unload(strong.clone()).unwrap();
    drop(strong);

    assert!(weak.upgrade().is_none());
    assert!(!dynamic.gc_roots_released());
    assert!(unload::scout(&mm, &weak));
    assert!(dynamic.gc_roots_released());
    assert!(static_asm.gc_roots_released());
}

/// Scenario 5: a resolve callback that never resolves converts to `None`
/// through the `_nofail` wrapper rather than propagating an error.
#[test]
fn unresolved_callback_yields_none_not_panic() {
    let alc = Alc::create_individual(ManagedHandle::None, false, None);
    assert_eq!(resolve::resolving_nofail(&alc, "Never.Resolves"), None);
}

/// Scenario 6: calling the scout on a still-referenced memory manager
/// leaves it untouched; a later call after the reference truly drops
/// frees it.
#[test]
fn scout_is_idempotent_until_truly_unreferenced() {
    let alc = Alc::create_individual(ManagedHandle::None, true, None);
    let mm = alc.singleton_mm();
    let weak = mm.get_loader_alloc().unwrap();

    assert!(!unload::scout(&mm, &weak));
    assert!(registry::registry().all().iter().any(|a| Arc::ptr_eq(a, &alc)));

    mm.release_strong_handle();
    assert!(unload::scout(&mm, &weak));
    assert!(!registry::registry().all().iter().any(|a| Arc::ptr_eq(a, &alc)));
}

/// `prepare_unload` on a non-collectible ALC is a programmer error the
/// caller is expected to react to, not a panic.
#[test]
fn prepare_unload_non_collectible_is_an_error() {
    let alc = Alc::create_individual(ManagedHandle::None, false, None);
    let strong = Arc::new(Sentinel::new());
    assert_eq!(alc.prepare_unload(strong), Err(Error::AlcNotCollectible));
}

/// `merge` of two independently-interned generic managers returns the same
/// manager as directly requesting their combined set.
#[test]
fn merge_matches_direct_union() {
    let a = Alc::create_individual(ManagedHandle::None, true, None);
    let b = Alc::create_individual(ManagedHandle::None, true, None);
    let c = Alc::create_individual(ManagedHandle::None, true, None);

    let ab = get_for_alcs(&[a.clone(), b.clone()]);
    let bc = get_for_alcs(&[b.clone(), c.clone()]);
    let merged = merge(&ab, &bc);
    let direct = get_for_alcs(&[a, b, c]);
    assert!(Arc::ptr_eq(&merged, &direct));
}
