//! Stand-in for a managed object reachable only through a GC handle.
//!
//! Two distinct pieces of state in this subsystem are governed by the same
//! strong/weak GC-handle dance: an ALC's own managed `AssemblyLoadContext`
//! object, and a memory manager's "loader allocator" sentinel. The garbage
//! collector that would own these objects for real is out of scope (see
//! SPEC_FULL §2 External Collaborators); `Sentinel` exists only so both
//! cases can share `Arc`/`Weak` reachability semantics instead of each
//! inventing its own notion of "still referenced".

use std::sync::{Arc, Weak};

/// A GC handle target. Holding a `StrongHandle` keeps it alive; holding
/// only a `WeakHandle` observes liveness without extending it.
#[derive(Debug)]
pub struct Sentinel;

impl Sentinel {
    pub fn new() -> Self {
        Sentinel
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::new()
    }
}

pub type StrongHandle = Arc<Sentinel>;
pub type WeakHandle = Weak<Sentinel>;

/// The handle an ALC (or a memory manager) currently holds on its own
/// managed counterpart: nothing yet, a strong handle, or a weak one.
#[derive(Debug, Default, Clone)]
pub enum ManagedHandle {
    #[default]
    None,
    Strong(StrongHandle),
    Weak(WeakHandle),
}

impl ManagedHandle {
    pub fn is_strong(&self) -> bool {
        matches!(self, ManagedHandle::Strong(_))
    }

    pub fn is_weak(&self) -> bool {
        matches!(self, ManagedHandle::Weak(_))
    }

    /// A weak view of whatever this handle currently holds, or `None` if
    /// nothing has ever been installed.
    pub fn as_weak(&self) -> Option<WeakHandle> {
        match self {
            ManagedHandle::Strong(s) => Some(Arc::downgrade(s)),
            ManagedHandle::Weak(w) => Some(w.clone()),
            ManagedHandle::None => None,
        }
    }
}
