//! The assembly load context (SPEC_FULL §4.4): a unit of assembly isolation
//! and unload granularity. Owns a loaded-image registry, its assemblies, its
//! singleton memory manager, and the set of generic memory managers it
//! participates in.

use crate::assembly::Assembly;
use crate::domain;
use crate::memory_manager::MemoryManager;
use crate::registry;
use crate::sentinel::{ManagedHandle, StrongHandle};
use crate::{AlcHandle, MmHandle};
use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Placeholder for a loaded assembly image. The metadata loader that would
/// own the rest of an image's contents is out of scope (SPEC_FULL §1); the
/// ALC only needs to know one was loaded, by path.
struct LoadedImage {
    #[allow(dead_code)]
    path: String,
}

pub struct Alc {
    name: Option<String>,
    collectible: bool,
    unloading: AtomicBool,
    managed_handle: Mutex<ManagedHandle>,
    singleton_mm: OnceLock<MmHandle>,
    generic_memory_managers: Mutex<Vec<MmHandle>>,
    /// Lock-free fast path for the single-ALC case of the interning cache
    /// (SPEC_FULL §4.3 step 2). Only ever populated when this ALC is the
    /// sole member of a generic memory manager's ALC set.
    generic_mm_fastpath: ArcSwapOption<MemoryManager>,
    loaded_images: Mutex<HashMap<String, LoadedImage>>,
    assemblies: Mutex<Vec<Arc<Assembly>>>,
    pinvoke_scopes: Mutex<HashMap<String, usize>>,
    self_weak: std::sync::Weak<Alc>,
}

impl Alc {
    /// Creates an individual (non-default) or default ALC. Registers the
    /// new ALC in the process-wide registry and, for a collectible ALC,
    /// eagerly realizes the singleton memory manager's loader-allocator
    /// sentinel (SPEC_FULL §4.4 creation).
    pub fn create_individual(
        managed_handle: ManagedHandle,
        collectible: bool,
        name: Option<String>,
    ) -> AlcHandle {
        let alc = Arc::new_cyclic(|weak| Alc {
            name,
            collectible,
            unloading: AtomicBool::new(false),
            managed_handle: Mutex::new(managed_handle),
            singleton_mm: OnceLock::new(),
            generic_memory_managers: Mutex::new(Vec::new()),
            generic_mm_fastpath: ArcSwapOption::from(None),
            loaded_images: Mutex::new(HashMap::new()),
            assemblies: Mutex::new(Vec::new()),
            pinvoke_scopes: Mutex::new(HashMap::new()),
            self_weak: weak.clone(),
        });

        let mm = MemoryManager::create_singleton(Arc::downgrade(&alc), collectible);
        alc.singleton_mm
            .set(mm)
            .unwrap_or_else(|_| unreachable!("singleton_mm set exactly once during construction"));

        if collectible {
            // Realize the sentinel now rather than on first use, so a
            // collectible ALC always has something for `prepare_unload` to
            // swap a strong handle into.
            alc.singleton_mm().get_loader_alloc();
        }

        registry::registry().register(alc.clone());
        oxidex_log::debug!(
            "created ALC '{}' (collectible={})",
            alc.display_name(),
            collectible
        );
        alc
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn is_collectible(&self) -> bool {
        self.collectible
    }

    pub fn is_unloading(&self) -> bool {
        self.unloading.load(Ordering::Acquire)
    }

    pub fn singleton_mm(&self) -> MmHandle {
        self.singleton_mm
            .get()
            .expect("singleton_mm is set during Alc construction")
            .clone()
    }

    pub fn generic_memory_managers_snapshot(&self) -> Vec<MmHandle> {
        self.generic_memory_managers.lock().unwrap().clone()
    }

    /// Access to the generic-memory-managers list lock, for the interning
    /// cache (SPEC_FULL §4.3 steps 4-5) and for unload (§4.4).
    pub(crate) fn generic_memory_managers(&self) -> &Mutex<Vec<MmHandle>> {
        &self.generic_memory_managers
    }

    /// Access to the lock-free single-ALC fast-path slot, for the interning
    /// cache only.
    pub(crate) fn fastpath(&self) -> &ArcSwapOption<MemoryManager> {
        &self.generic_mm_fastpath
    }

    pub fn attach_handle_if_unset(&self, handle: ManagedHandle) {
        let mut current = self.managed_handle.lock().unwrap();
        if matches!(*current, ManagedHandle::None) {
            *current = handle;
        }
    }

    pub fn managed_handle(&self) -> ManagedHandle {
        self.managed_handle.lock().unwrap().clone()
    }

    // -- loaded images ---------------------------------------------------

    pub fn register_image(&self, path: impl Into<String>) {
        let path = path.into();
        self.loaded_images
            .lock()
            .unwrap()
            .insert(path.clone(), LoadedImage { path });
    }

    pub fn is_image_loaded(&self, path: &str) -> bool {
        self.loaded_images.lock().unwrap().contains_key(path)
    }

    // -- p/invoke scopes ---------------------------------------------------

    pub fn set_pinvoke_scope(&self, name: impl Into<String>, handle: usize) {
        self.pinvoke_scopes.lock().unwrap().insert(name.into(), handle);
    }

    pub fn pinvoke_scope(&self, name: &str) -> Option<usize> {
        self.pinvoke_scopes.lock().unwrap().get(name).copied()
    }

    // -- assembly attachment (SPEC_FULL §4.4) -----------------------------

    /// Attaches a new assembly to this ALC, jointly referenced by the ALC
    /// and the root domain (SPEC_FULL §3: "refcount held jointly by its ALC
    /// and the root domain"). Fails once the ALC has begun unloading.
    pub fn load_assembly(
        &self,
        name: impl Into<String>,
        dynamic: bool,
    ) -> crate::error::Result<Arc<Assembly>> {
        if self.is_unloading() {
            return Err(crate::error::Error::AlcUnloading);
        }
        let assembly = Assembly::new(name, dynamic, self.self_weak.clone());
        self.assemblies.lock().unwrap().push(assembly.clone());
        domain::root_domain().register(&assembly);
        Ok(assembly)
    }

    pub fn assemblies_snapshot(&self) -> Vec<Arc<Assembly>> {
        self.assemblies.lock().unwrap().clone()
    }

    // -- unload (SPEC_FULL §4.4) -------------------------------------------

    /// Step one of the two-phase unload protocol. Flips `unloading`, swaps
    /// the ALC's managed handle from weak to the caller-supplied strong
    /// handle, and releases the strong loader-allocator handle on the
    /// singleton MM and on every generic MM this ALC participates in.
    pub fn prepare_unload(&self, strong_handle: StrongHandle) -> crate::error::Result<()> {
        if !self.collectible {
            return Err(crate::error::Error::AlcNotCollectible);
        }
        if self.unloading.swap(true, Ordering::AcqRel) {
            return Err(crate::error::Error::AlcAlreadyUnloading);
        }

        {
            let mut handle = self.managed_handle.lock().unwrap();
            *handle = ManagedHandle::Strong(strong_handle);
        }

        self.singleton_mm().release_strong_handle();
        for mm in self.generic_memory_managers.lock().unwrap().iter() {
            mm.release_strong_handle();
        }

        oxidex_log::debug!("ALC '{}' prepared for unload", self.display_name());
        Ok(())
    }
}

/// Step two of the two-phase unload protocol (SPEC_FULL §4.4
/// `finalize_unload`), dispatched by the unload coordinator (`unload.rs`)
/// once a loader-allocator sentinel's weak handle is observed null.
pub fn finalize_unload(mm: &MmHandle) -> bool {
    if mm.is_generic() {
        let members = mm.generic_alcs();
        for alc in &members {
            debug_assert!(
                alc.is_unloading(),
                "generic MM finalized before member ALC reached unloading"
            );
            alc.generic_memory_managers
                .lock()
                .unwrap()
                .retain(|m| !Arc::ptr_eq(m, mm));
        }
        mm.delete();
        oxidex_log::debug!("finalized generic memory manager ({} members)", members.len());
        return true;
    }

    let alc = mm
        .owning_alc()
        .expect("singleton memory manager always has an owning ALC");

    registry::registry().remove(&alc);
    cleanup_assemblies(&alc);
    mm.delete();

    // Detach this ALC from every generic MM it still participates in,
    // tearing down any that become empty as a result (SPEC_FULL §9 decision
    // 2: do not replicate the original's omission of this cleanup).
    let generic_mms: Vec<MmHandle> = alc.generic_memory_managers.lock().unwrap().drain(..).collect();
    for gmm in generic_mms {
        if gmm.remove_generic_alc(&alc) == 0 {
            gmm.delete();
        }
    }

    {
        let mut handle = alc.managed_handle.lock().unwrap();
        *handle = ManagedHandle::None;
    }
    alc.pinvoke_scopes.lock().unwrap().clear();

    oxidex_log::debug!("finalized ALC '{}'", alc.display_name());
    true
}

/// `cleanup_assemblies` (SPEC_FULL §4.4): staged to tolerate cross-
/// references between dynamic and non-dynamic assemblies. Dynamic
/// assemblies close first; a non-dynamic assembly referencing a dynamic one
/// through its image pool would otherwise risk being freed while the
/// dynamic assembly still holds a back-reference.
fn cleanup_assemblies(alc: &AlcHandle) {
    let assemblies: Vec<Arc<Assembly>> = alc.assemblies.lock().unwrap().drain(..).collect();

    for assembly in &assemblies {
        domain::root_domain().remove_and_release(assembly);
    }
    for assembly in &assemblies {
        assembly.release_gc_roots();
    }

    let mut slots: Vec<Option<Arc<Assembly>>> = assemblies.into_iter().map(Some).collect();

    for slot in slots.iter_mut() {
        if let Some(assembly) = slot {
            if assembly.dynamic && assembly.close_except_image_pools() {
                *slot = None;
            }
        }
    }
    for slot in slots.iter_mut() {
        if let Some(assembly) = slot {
            if !assembly.dynamic && assembly.close_except_image_pools() {
                *slot = None;
            }
        }
    }
    for slot in slots.iter() {
        if let Some(assembly) = slot {
            assembly.close_finish();
        }
    }

    alc.loaded_images.lock().unwrap().clear();
}
