//! On-demand binding of native imports.
//!
//! Entry points are declared against a library *name*, not a path. When one
//! is bound, the linker first asks the installed import resolver for the
//! symbol; if the resolver declines, the platform file name of the library is
//! opened through the loader's default search path. Default-resolved
//! libraries stay loaded for the linker's lifetime. Libraries served by the
//! resolver are never retained by the linker.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::{HostError, LoadError, Result};
use crate::library::{platform_file_name, LibraryLoader, NativeLibrary};

/// Callback consulted before default resolution: given a library name and a
/// symbol, the symbol's address, or `None` to decline.
pub type ImportResolver =
    Box<dyn Fn(&str, &str) -> Option<std::result::Result<*mut c_void, LoadError>> + Send + Sync>;

/// The import-binding layer of the process.
pub struct ImportLinker {
    loader: Arc<dyn LibraryLoader>,
    resolver: OnceCell<ImportResolver>,
    defaults: Mutex<HashMap<String, Arc<dyn NativeLibrary>>>,
}

impl ImportLinker {
    /// Create a linker with no resolver installed.
    pub fn new(loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            loader,
            resolver: OnceCell::new(),
            defaults: Mutex::new(HashMap::new()),
        }
    }

    /// Register the import resolver on behalf of `library`. Registration
    /// cannot be undone.
    pub fn set_resolver<F>(&self, library: &str, resolver: F) -> Result<()>
    where
        F: Fn(&str, &str) -> Option<std::result::Result<*mut c_void, LoadError>> + Send + Sync + 'static,
    {
        self.resolver
            .set(Box::new(resolver))
            .map_err(|_| HostError::ResolverAlreadyInstalled {
                library: library.to_string(),
            })
    }

    /// Whether an import resolver has been registered.
    pub fn has_resolver(&self) -> bool {
        self.resolver.get().is_some()
    }

    /// Open `name` by its platform file name, once per linker.
    fn default_library(&self, name: &str) -> std::result::Result<Arc<dyn NativeLibrary>, LoadError> {
        let mut defaults = self.defaults.lock();
        if let Some(library) = defaults.get(name) {
            return Ok(library.clone());
        }
        let file_name = platform_file_name(name);
        tracing::debug!(library = name, file = %file_name, "falling back to default resolution");
        let library = self.loader.open(Path::new(&file_name))?;
        defaults.insert(name.to_string(), library.clone());
        Ok(library)
    }

    /// Address of `symbol` in the library serving `library`.
    pub fn bind(&self, library: &str, symbol: &str) -> Result<*mut c_void> {
        let unresolved = |source| HostError::Unresolved {
            library: library.to_string(),
            symbol: symbol.to_string(),
            source: Some(source),
        };
        if let Some(resolver) = self.resolver.get() {
            if let Some(found) = resolver(library, symbol) {
                return found.map_err(unresolved);
            }
        }
        let lib = self.default_library(library).map_err(unresolved)?;
        lib.symbol(symbol).map_err(unresolved)
    }

    /// Bind `symbol` as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type whose signature matches the
    /// exported symbol, and the serving library must stay loaded while the
    /// returned pointer is in use.
    pub unsafe fn import<F: Copy>(&self, library: &str, symbol: &str) -> Result<F> {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
        let address = self.bind(library, symbol)?;
        Ok(std::mem::transmute_copy(&address))
    }
}

impl std::fmt::Debug for ImportLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportLinker")
            .field("has_resolver", &self.has_resolver())
            .field("defaults", &self.defaults.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}
