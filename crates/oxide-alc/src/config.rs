//! Process-wide runtime configuration.
//!
//! Mirrors `oxidex_log`'s `OnceLock`-backed singleton: set once early in
//! process lifetime, read freely afterward without further synchronization
//! cost.

use std::sync::OnceLock;

/// Flags that change how the ALC/MM subsystem behaves, set once at process
/// startup by the embedding runtime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// When set, resolution callbacks (`Load`, `Resolving`,
    /// `ResolveSatellite`) are never invoked and always behave as if they
    /// returned nothing. Used for ahead-of-time compilation passes that
    /// must not execute managed code.
    pub no_exec: bool,
    /// Enables performance-counter bookkeeping for allocation and unload
    /// activity.
    pub perf_counters: bool,
    /// Freezes a memory manager instead of releasing its backing pages on
    /// `delete`, so a post-mortem debugger can still walk its contents.
    pub debug_unload: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            no_exec: false,
            perf_counters: false,
            debug_unload: false,
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Installs the process-wide configuration. Only the first call takes
/// effect; later calls are ignored, matching the "set once at startup"
/// contract.
pub fn init(config: RuntimeConfig) {
    let _ = CONFIG.set(config);
}

/// Reads the current configuration, or the default if `init` was never
/// called.
pub fn get() -> RuntimeConfig {
    CONFIG.get().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let cfg = RuntimeConfig::default();
        assert!(!cfg.no_exec);
        assert!(!cfg.perf_counters);
        assert!(!cfg.debug_unload);
    }
}
