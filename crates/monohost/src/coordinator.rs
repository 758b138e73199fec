//! Lifecycle coordinator for the shared runtime library load.
//!
//! Any number of [`HostHandle`]s may be alive at once, all against the same
//! library path. The first acquisition loads the library and activates the
//! import resolver; dropping the last handle deactivates the resolver and
//! unloads the library. Every transition happens under one lock, so a
//! concurrent acquirer either sees a fully loaded runtime or waits for it.
//!
//! # Example
//!
//! ```rust,ignore
//! use monohost::Coordinator;
//!
//! let host = Coordinator::global().acquire("/app/libmonosgen-2.0.so")?;
//! let vm = host.vm()?;
//! // ...
//! drop(host); // unloads when this was the last handle
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{HostError, Result};
use crate::library::{LibraryLoader, NativeLibrary, SystemLoader};
use crate::linker::ImportLinker;
use crate::resolver::{RuntimeResolver, MONO_RUNTIME};
use crate::vm::VmSession;

static GLOBAL: Lazy<Arc<Coordinator>> = Lazy::new(|| Arc::new(Coordinator::new(Arc::new(SystemLoader))));

/// Shared state guarded by the coordinator's lock.
///
/// `library` and `loaded_path` are present exactly when `reference_count > 0`.
/// `library` is the only strong reference to the load; the resolver holds a
/// `Weak`.
#[derive(Default)]
struct RuntimeLibraryState {
    reference_count: usize,
    loaded_path: Option<PathBuf>,
    library: Option<Arc<dyn NativeLibrary>>,
    resolver_installed: bool,
}

/// Point-in-time view of the coordinator's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryStatus {
    /// Live host handles
    pub reference_count: usize,
    /// Path of the loaded runtime library, if any
    pub loaded_path: Option<PathBuf>,
    /// Whether the import resolver has ever been registered
    pub resolver_installed: bool,
    /// Whether the resolver currently serves the runtime library
    pub resolver_active: bool,
}

/// Owns the single runtime library load shared by all host handles.
pub struct Coordinator {
    loader: Arc<dyn LibraryLoader>,
    resolver: Arc<RuntimeResolver>,
    linker: ImportLinker,
    state: Mutex<RuntimeLibraryState>,
}

impl Coordinator {
    /// Create a coordinator that loads libraries through `loader`.
    pub fn new(loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            linker: ImportLinker::new(loader.clone()),
            loader,
            resolver: Arc::new(RuntimeResolver::new()),
            state: Mutex::new(RuntimeLibraryState::default()),
        }
    }

    /// Process-wide coordinator backed by the OS loader.
    pub fn global() -> &'static Arc<Coordinator> {
        &GLOBAL
    }

    /// Take a reference on the runtime library at `path`, loading it if no
    /// handle is currently alive.
    ///
    /// The path is not checked for existence here; see [`crate::make`].
    pub fn acquire(self: &Arc<Self>, path: impl AsRef<Path>) -> Result<HostHandle> {
        let path = path.as_ref();
        let mut state = self.state.lock();

        if state.reference_count > 0 {
            // Compared byte for byte, without normalising separators or `.`
            if let Some(loaded) = state
                .loaded_path
                .as_deref()
                .filter(|loaded| loaded.as_os_str() != path.as_os_str())
            {
                return Err(HostError::ConflictingLibraryPath {
                    requested: path.to_path_buf(),
                    loaded: loaded.to_path_buf(),
                });
            }
        }

        state.reference_count += 1;
        if state.reference_count == 1 {
            state.loaded_path = Some(path.to_path_buf());
            if let Err(err) = self.set_up(&mut state, path) {
                state.reference_count -= 1;
                state.loaded_path = None;
                return Err(err);
            }
        }
        tracing::debug!(path = %path.display(), refs = state.reference_count, "acquired runtime host");

        Ok(HostHandle {
            coordinator: Arc::clone(self),
            released: false,
        })
    }

    fn set_up(&self, state: &mut RuntimeLibraryState, path: &Path) -> Result<()> {
        let library = self
            .loader
            .open(path)
            .map_err(|source| HostError::LibraryLoadFailed {
                path: path.to_path_buf(),
                source,
            })?;

        if !state.resolver_installed {
            tracing::info!(
                "setting up resolver for {} => {}",
                MONO_RUNTIME,
                path.display()
            );
            let resolver = Arc::clone(&self.resolver);
            self.linker
                .set_resolver(MONO_RUNTIME, move |name, symbol| resolver.lookup(name, symbol))?;
            state.resolver_installed = true;
        }

        self.resolver.activate(&library);
        state.library = Some(library);
        Ok(())
    }

    fn release(&self) {
        let mut state = self.state.lock();
        let Some(remaining) = state.reference_count.checked_sub(1) else {
            tracing::error!("runtime host released with no outstanding references");
            return;
        };
        state.reference_count = remaining;
        tracing::debug!(refs = remaining, "released runtime host");
        if remaining > 0 {
            return;
        }

        // The state holds the only strong reference; once the resolver stops
        // lending it out, dropping it here unloads under the lock.
        self.resolver.deactivate();
        if let Some(library) = state.library.take() {
            if Arc::strong_count(&library) != 1 {
                tracing::error!(
                    path = library.path(),
                    refs = Arc::strong_count(&library),
                    "runtime library still referenced at teardown"
                );
            }
            drop(library);
        }
        if let Some(path) = state.loaded_path.take() {
            tracing::info!(path = %path.display(), "tore down runtime host");
        }
    }

    /// Snapshot of the shared state.
    pub fn status(&self) -> LibraryStatus {
        let state = self.state.lock();
        LibraryStatus {
            reference_count: state.reference_count,
            loaded_path: state.loaded_path.clone(),
            resolver_installed: state.resolver_installed,
            resolver_active: self.resolver.is_active(),
        }
    }

    /// The resolver serving [`MONO_RUNTIME`].
    pub fn resolver(&self) -> &RuntimeResolver {
        &self.resolver
    }

    /// The linker entry points are bound through.
    pub fn linker(&self) -> &ImportLinker {
        &self.linker
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("status", &self.status())
            .finish()
    }
}

/// A claim on the shared runtime library load.
///
/// Dropping the handle releases the claim. [`HostHandle::release`] does the
/// same explicitly; a handle can only be released once.
#[must_use = "dropping a HostHandle releases the runtime library"]
pub struct HostHandle {
    coordinator: Arc<Coordinator>,
    released: bool,
}

impl HostHandle {
    /// Bind the runtime's entry points for use against this load.
    ///
    /// The session borrows the handle, so it cannot outlive the load.
    pub fn vm(&self) -> Result<VmSession<'_>> {
        VmSession::bind(self)
    }

    /// Coordinator this handle was issued by.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Release the claim now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.coordinator.release();
        }
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostHandle")
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
