//! The unload coordinator (SPEC_FULL §4.6), colloquially "the scout":
//! invoked by the managed runtime when a loader-allocator sentinel is
//! finalized, i.e. its weak handle has become null.

use crate::alc;
use crate::sentinel::WeakHandle;
use crate::MmHandle;

/// Re-reads `weak`'s target. If a managed reference reappeared between the
/// sentinel being finalized and this call running, abort without touching
/// `mm`. Otherwise dispatch to `alc::finalize_unload`.
pub fn scout(mm: &MmHandle, weak: &WeakHandle) -> bool {
    if weak.upgrade().is_some() {
        oxidex_log::debug!("scout: sentinel re-resurrected before finalize, aborting");
        return false;
    }
    alc::finalize_unload(mm)
}

/// `LoaderAllocatorScout.Destroy(mm_ptr)` (SPEC_FULL §6): returns whether
/// the memory manager was freed. A memory manager whose sentinel was never
/// realized (non-collectible, or collectible but never asked for one) has
/// nothing to finalize.
pub fn destroy(mm: &MmHandle) -> bool {
    match mm.weak_handle() {
        Some(weak) => scout(mm, &weak),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alc::Alc;
    use crate::registry;
    use crate::sentinel::ManagedHandle;
    use std::sync::Arc;

    #[test]
    fn destroy_returns_false_while_still_referenced() {
        let alc = Alc::create_individual(ManagedHandle::None, true, None);
        let mm = alc.singleton_mm();
        let _weak = mm.get_loader_alloc().unwrap();
        // A strong handle is still alive internally (never released), so
        // the weak handle's target is non-null.
        assert!(!destroy(&mm));
        assert!(registry::registry().all().iter().any(|a| Arc::ptr_eq(a, &alc)));
    }

    #[test]
    fn destroy_frees_once_truly_unreferenced() {
        let alc = Alc::create_individual(ManagedHandle::None, true, None);
        let mm = alc.singleton_mm();
        mm.get_loader_alloc();
        mm.release_strong_handle();
        assert!(destroy(&mm));
        assert!(!registry::registry().all().iter().any(|a| Arc::ptr_eq(a, &alc)));
    }
}
