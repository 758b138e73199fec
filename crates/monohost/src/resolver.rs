//! Import resolver for the hosted runtime.
//!
//! The linker asks the resolver whenever an entry point declared against
//! [`MONO_RUNTIME`] is bound. While a runtime load is active the resolver
//! serves that load; otherwise it answers "unresolved" and the linker falls
//! back to default resolution.
//!
//! The resolver never owns the load. It keeps a `Weak` reference, upgraded
//! only for the duration of a lookup under the slot's read lock. The
//! coordinator deactivates the slot (taking the write lock) before it drops
//! its own reference, so the library is always unloaded by the coordinator,
//! under the coordinator's lock.

use std::ffi::c_void;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::LoadError;
use crate::library::NativeLibrary;

/// Fixed library name the runtime's entry points are declared against.
pub const MONO_RUNTIME: &str = "monosgen-2.0";

#[derive(Default)]
struct Slot {
    active: bool,
    library: Option<Weak<dyn NativeLibrary>>,
}

/// Resolves [`MONO_RUNTIME`] to the coordinator's current load.
#[derive(Default)]
pub struct RuntimeResolver {
    slot: RwLock<Slot>,
}

impl RuntimeResolver {
    /// Create an inactive resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the active load serving `library_name`, or return
    /// `None` to fall back to default resolution.
    fn with_library<R>(&self, library_name: &str, f: impl FnOnce(&dyn NativeLibrary) -> R) -> Option<R> {
        if library_name != MONO_RUNTIME {
            return None;
        }
        let slot = self.slot.read();
        if !slot.active {
            return None;
        }
        let library = slot.library.as_ref()?.upgrade()?;
        Some(f(library.as_ref()))
    }

    /// OS handle of the load serving `library_name`, or `None` when
    /// unresolved. The handle does not keep the library loaded.
    pub fn resolve(&self, library_name: &str) -> Option<*mut c_void> {
        self.with_library(library_name, |library| library.raw_handle())
    }

    /// Address of `symbol` in the load serving `library_name`, or `None` when
    /// unresolved.
    pub fn lookup(&self, library_name: &str, symbol: &str) -> Option<Result<*mut c_void, LoadError>> {
        self.with_library(library_name, |library| library.symbol(symbol))
    }

    /// Whether resolutions currently succeed.
    pub fn is_active(&self) -> bool {
        self.slot.read().active
    }

    pub(crate) fn activate(&self, library: &Arc<dyn NativeLibrary>) {
        let mut slot = self.slot.write();
        slot.library = Some(Arc::downgrade(library));
        slot.active = true;
    }

    /// Stop serving the load. Returns once no lookup still holds it.
    pub(crate) fn deactivate(&self) {
        let mut slot = self.slot.write();
        slot.active = false;
        slot.library = None;
    }
}

impl std::fmt::Debug for RuntimeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read();
        let path = slot
            .library
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|l| l.path().to_string());
        f.debug_struct("RuntimeResolver")
            .field("active", &slot.active)
            .field("library", &path)
            .finish()
    }
}
