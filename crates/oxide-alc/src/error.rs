//! Error types for the assembly load context / memory manager subsystem.
//!
//! Most failure modes named in the component design are not represented
//! here at all: a programmer invariant violation is a `debug_assert!`
//! panic, and allocation failure at the mempool/LFA layer is an `expect()`
//! abort (see the module docs on `memory_manager` and `oxidex_mem::arena`).
//! `Error` is reserved for the handful of outcomes a caller is expected to
//! react to rather than treat as a bug: an unload race, and a managed
//! resolution callback that failed.

use std::fmt;

/// Errors surfaced by the public API of this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `prepare_unload` was called on an ALC that is not collectible.
    AlcNotCollectible,

    /// `prepare_unload` was called twice on the same ALC.
    AlcAlreadyUnloading,

    /// `finalize_unload` observed the sentinel's weak handle had become
    /// non-null again between the scout firing and the finalize call
    /// actually running; the MM was left untouched.
    UnloadRace,

    /// A managed resolution callback (`Load`, `Resolving`,
    /// `ResolveSatellite`) failed or returned no assembly.
    ResolutionFailed {
        /// Which callback failed.
        callback: ResolveKind,
        /// The assembly name that was being resolved.
        assembly_name: String,
    },

    /// An allocation was attempted against a frozen memory manager.
    MemoryManagerFrozen,

    /// `code_commit` was given a pointer outside any region this memory
    /// manager reserved, or asked to grow a region past its capacity.
    InvalidCodeCommit,

    /// An assembly attach was attempted on an ALC already past
    /// `prepare_unload`.
    AlcUnloading,
}

/// Which of the three managed resolution entry points failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    /// `MonoResolveUsingLoad`.
    Load,
    /// `MonoResolveUsingResolvingEvent`.
    Resolving,
    /// `MonoResolveUsingResolveSatelliteAssembly`.
    ResolveSatellite,
}

impl fmt::Display for ResolveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveKind::Load => write!(f, "Load"),
            ResolveKind::Resolving => write!(f, "Resolving"),
            ResolveKind::ResolveSatellite => write!(f, "ResolveSatellite"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlcNotCollectible => {
                write!(f, "cannot prepare a non-collectible ALC for unload")
            }
            Error::AlcAlreadyUnloading => {
                write!(f, "ALC is already unloading")
            }
            Error::UnloadRace => {
                write!(f, "unload race: a managed reference reappeared before finalize")
            }
            Error::ResolutionFailed {
                callback,
                assembly_name,
            } => {
                write!(
                    f,
                    "managed resolution callback {callback} failed for assembly '{assembly_name}'"
                )
            }
            Error::MemoryManagerFrozen => {
                write!(f, "memory manager is frozen; no further allocation allowed")
            }
            Error::InvalidCodeCommit => {
                write!(f, "code commit ptr is out of bounds or exceeds region capacity")
            }
            Error::AlcUnloading => {
                write!(f, "cannot attach a new assembly to an ALC that is unloading")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
