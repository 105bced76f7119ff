//! Process-wide registry of live assembly load contexts (SPEC_FULL §4.4
//! `init_defaults`, §4.5 external interface `InitializeNativeALC`).
//!
//! Guards the outermost lock in SPEC_FULL §5's acquisition order: the ALC
//! registry lock.

use crate::alc::Alc;
use crate::sentinel::ManagedHandle;
use crate::AlcHandle;
use std::sync::{Arc, Mutex, OnceLock};

pub struct AlcRegistry {
    alcs: Mutex<Vec<AlcHandle>>,
    default_alc: OnceLock<AlcHandle>,
}

impl AlcRegistry {
    fn new() -> Self {
        AlcRegistry {
            alcs: Mutex::new(Vec::new()),
            default_alc: OnceLock::new(),
        }
    }

    pub fn register(&self, alc: AlcHandle) {
        self.alcs.lock().unwrap().push(alc);
    }

    pub fn remove(&self, alc: &AlcHandle) {
        self.alcs.lock().unwrap().retain(|a| !Arc::ptr_eq(a, alc));
    }

    pub fn all(&self) -> Vec<AlcHandle> {
        self.alcs.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.alcs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates the default ALC on first call; every later call returns the
    /// same one. The default ALC is never collectible and is never freed.
    pub fn init_defaults(&self) -> AlcHandle {
        self.default_alc
            .get_or_init(|| Alc::create_individual(ManagedHandle::None, false, None))
            .clone()
    }

    pub fn default_alc(&self) -> AlcHandle {
        self.init_defaults()
    }
}

static REGISTRY: OnceLock<AlcRegistry> = OnceLock::new();

pub fn registry() -> &'static AlcRegistry {
    REGISTRY.get_or_init(AlcRegistry::new)
}

/// Ensures the default ALC exists and returns it. Idempotent; safe to call
/// from process init or lazily from the first caller that needs it.
pub fn init_defaults() -> AlcHandle {
    registry().init_defaults()
}

pub fn default_alc() -> AlcHandle {
    registry().default_alc()
}

/// `InitializeNativeALC(handle, name, is_default, collectible)` (SPEC_FULL
/// §6): if `is_default`, adopt the existing default ALC, attaching its
/// managed handle if one was not already set; otherwise create a fresh
/// individual ALC.
pub fn initialize_native_alc(
    handle: ManagedHandle,
    name: Option<String>,
    is_default: bool,
    collectible: bool,
) -> AlcHandle {
    if is_default {
        let default = init_defaults();
        default.attach_handle_if_unset(handle);
        default
    } else {
        Alc::create_individual(handle, collectible, name)
    }
}

/// `GetLoadContextForAssembly(assembly)` (SPEC_FULL §6): returns the
/// managed handle of the assembly's owning ALC, if the assembly still has
/// one.
pub fn get_load_context_for_assembly(assembly: &crate::assembly::Assembly) -> Option<ManagedHandle> {
    assembly.owning_alc().map(|alc| alc.managed_handle())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_defaults_is_idempotent() {
        let registry = AlcRegistry::new();
        let first = registry.init_defaults();
        let second = registry.init_defaults();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.is_collectible());
    }

    #[test]
    fn register_and_remove_track_membership() {
        let registry = AlcRegistry::new();
        let alc = Alc::create_individual(ManagedHandle::None, false, None);
        registry.register(alc.clone());
        assert_eq!(registry.len(), 1);
        registry.remove(&alc);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn initialize_native_alc_adopts_existing_default() {
        let alc1 = initialize_native_alc(ManagedHandle::None, None, true, false);
        let alc2 = initialize_native_alc(ManagedHandle::None, None, true, false);
        assert!(Arc::ptr_eq(&alc1, &alc2));
    }
}
