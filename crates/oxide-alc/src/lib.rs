//! The assembly load context (ALC) and memory manager subsystem.
//!
//! See `SPEC_FULL.md` at the workspace root for the full component design;
//! each module here corresponds to one of its numbered components.

pub mod alc;
pub mod assembly;
pub mod config;
pub mod coop_lock;
pub mod domain;
pub mod error;
pub mod interning;
pub mod intrinsics;
pub mod memory_manager;
pub mod pools;
pub mod registry;
pub mod resolve;
pub mod sentinel;
pub mod unload;

pub use alc::Alc;
pub use error::{Error, Result};
pub use memory_manager::MemoryManager;

/// Shared handle to an [`Alc`]. ALCs have stable pointer identity for the
/// life of the process; equality between two handles is `Arc::ptr_eq`.
pub type AlcHandle = std::sync::Arc<Alc>;

/// Shared handle to a [`MemoryManager`].
pub type MmHandle = std::sync::Arc<MemoryManager>;
