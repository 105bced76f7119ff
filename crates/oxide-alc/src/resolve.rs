//! Resolution callbacks (SPEC_FULL §4.5): thin plumbing that invokes the
//! three managed entry points resolved by class name `AssemblyLoadContext`
//! on behalf of a failed native assembly lookup.
//!
//! The managed runtime that would actually resolve and invoke these methods
//! is out of scope (SPEC_FULL §1); callers install a native stand-in via
//! [`install_load`]/[`install_resolving`]/[`install_resolve_satellite`],
//! modeling "resolve the managed method pointer once" as a write-once
//! cache, same as a real embedding would cache a `MonoMethod*` looked up
//! by name on first use.

use crate::config;
use crate::error::{Error, ResolveKind, Result};
use crate::AlcHandle;
use std::sync::OnceLock;

/// An assembly reference as returned by a managed resolution callback. The
/// rest of an assembly's metadata belongs to the out-of-scope metadata
/// loader; this crate only needs the name to log and to hand back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRef(pub String);

/// A managed resolution entry point, as it would be invoked by native code:
/// an ALC handle and the stringified name of the assembly being resolved.
pub type ManagedCallback = fn(&AlcHandle, &str) -> Option<AssemblyRef>;

static LOAD_CALLBACK: OnceLock<ManagedCallback> = OnceLock::new();
static RESOLVING_CALLBACK: OnceLock<ManagedCallback> = OnceLock::new();
static RESOLVE_SATELLITE_CALLBACK: OnceLock<ManagedCallback> = OnceLock::new();

/// Installs the native stand-in for `MonoResolveUsingLoad`. Only the first
/// call takes effect, matching the "resolved once per runtime" contract.
pub fn install_load(cb: ManagedCallback) {
    let _ = LOAD_CALLBACK.set(cb);
}

/// Installs the native stand-in for `MonoResolveUsingResolvingEvent`. This
/// callback may legitimately be absent.
pub fn install_resolving(cb: ManagedCallback) {
    let _ = RESOLVING_CALLBACK.set(cb);
}

/// Installs the native stand-in for
/// `MonoResolveUsingResolveSatelliteAssembly`.
pub fn install_resolve_satellite(cb: ManagedCallback) {
    let _ = RESOLVE_SATELLITE_CALLBACK.set(cb);
}

fn invoke(
    kind: ResolveKind,
    cached: &OnceLock<ManagedCallback>,
    alc: &AlcHandle,
    assembly_name: &str,
) -> Result<AssemblyRef> {
    if config::get().no_exec {
        return Err(Error::ResolutionFailed {
            callback: kind,
            assembly_name: assembly_name.to_string(),
        });
    }

    let failure = || Error::ResolutionFailed {
        callback: kind,
        assembly_name: assembly_name.to_string(),
    };

    match cached.get() {
        Some(cb) => cb(alc, assembly_name).ok_or_else(failure),
        None => Err(failure()),
    }
}

fn nofail(kind: ResolveKind, result: Result<AssemblyRef>) -> Option<AssemblyRef> {
    match result {
        Ok(asm) => Some(asm),
        Err(err) => {
            oxidex_log::debug!("resolution callback {kind} did not resolve: {err}");
            None
        }
    }
}

/// `MonoResolveUsingLoad`. Assert-on-failure in the original runtime: a
/// caller that needs this to succeed should treat `Err` as a bug, but this
/// crate still returns `Result` rather than panicking, leaving the decision
/// to the caller (see `load_nofail` for the logging fallback used
/// everywhere else).
pub fn load(alc: &AlcHandle, assembly_name: &str) -> Result<AssemblyRef> {
    invoke(ResolveKind::Load, &LOAD_CALLBACK, alc, assembly_name)
}

pub fn load_nofail(alc: &AlcHandle, assembly_name: &str) -> Option<AssemblyRef> {
    nofail(ResolveKind::Load, load(alc, assembly_name))
}

/// `MonoResolveUsingResolvingEvent`. Best-effort: the managed
/// `AssemblyLoadContext.Resolving` event may have no subscribers, so a
/// failure here is never treated as a bug.
pub fn resolving(alc: &AlcHandle, assembly_name: &str) -> Result<AssemblyRef> {
    invoke(ResolveKind::Resolving, &RESOLVING_CALLBACK, alc, assembly_name)
}

pub fn resolving_nofail(alc: &AlcHandle, assembly_name: &str) -> Option<AssemblyRef> {
    nofail(ResolveKind::Resolving, resolving(alc, assembly_name))
}

/// `MonoResolveUsingResolveSatelliteAssembly`.
pub fn resolve_satellite(alc: &AlcHandle, assembly_name: &str) -> Result<AssemblyRef> {
    invoke(
        ResolveKind::ResolveSatellite,
        &RESOLVE_SATELLITE_CALLBACK,
        alc,
        assembly_name,
    )
}

pub fn resolve_satellite_nofail(alc: &AlcHandle, assembly_name: &str) -> Option<AssemblyRef> {
    nofail(ResolveKind::ResolveSatellite, resolve_satellite(alc, assembly_name))
}
