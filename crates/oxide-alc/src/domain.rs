//! A minimal stand-in for the root application domain's own assembly
//! tracking (SPEC_FULL §5 lock level 2: "root domain assemblies lock").
//!
//! The real root domain is a much larger structure (it hosts the default
//! ALC, JIT tables, and more) almost all of which is out of scope here.
//! The one piece this subsystem actually depends on is that the domain
//! keeps its own list of every loaded assembly and releases its share of
//! each assembly's refcount when that assembly's owning ALC tears down
//! (§4.4 step 1).

use crate::assembly::Assembly;
use std::sync::{Arc, Mutex, OnceLock};

pub struct RootDomain {
    assemblies: Mutex<Vec<Arc<Assembly>>>,
}

impl RootDomain {
    fn new() -> Self {
        RootDomain {
            assemblies: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, assembly: &Arc<Assembly>) {
        self.assemblies.lock().unwrap().push(Arc::clone(assembly));
    }

    /// Removes `assembly` from the domain's list and releases the
    /// domain's share of its refcount. Returns whether that release
    /// closed the assembly.
    pub fn remove_and_release(&self, assembly: &Arc<Assembly>) -> bool {
        self.assemblies
            .lock()
            .unwrap()
            .retain(|a| !Arc::ptr_eq(a, assembly));
        assembly.release_reference()
    }

    pub fn len(&self) -> usize {
        self.assemblies.lock().unwrap().len()
    }
}

static ROOT_DOMAIN: OnceLock<RootDomain> = OnceLock::new();

pub fn root_domain() -> &'static RootDomain {
    ROOT_DOMAIN.get_or_init(RootDomain::new)
}
