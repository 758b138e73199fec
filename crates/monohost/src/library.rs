//! Opening the runtime's shared library.
//!
//! [`Library`] wraps `dlopen` on Unix and `LoadLibraryW` on Windows. The
//! coordinator talks to the OS loader only through [`LibraryLoader`], so
//! that tests and embedders can substitute their own.

use std::ffi::{c_void, CString};
use std::path::Path;
use std::sync::Arc;

use crate::error::LoadError;

/// A loaded native library.
///
/// Dropping the last reference unloads the library.
pub trait NativeLibrary: Send + Sync {
    /// Path or name the library was opened from
    fn path(&self) -> &str;

    /// Raw OS handle, used as the library's identity
    fn raw_handle(&self) -> *mut c_void;

    /// Address of an exported symbol.
    ///
    /// Never returns a null address; a missing symbol is an error.
    fn symbol(&self, name: &str) -> Result<*mut c_void, LoadError>;
}

/// Opens native libraries by path.
pub trait LibraryLoader: Send + Sync {
    /// Load the library at `path`.
    fn open(&self, path: &Path) -> Result<Arc<dyn NativeLibrary>, LoadError>;
}

/// Loader backed by the OS dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl LibraryLoader for SystemLoader {
    fn open(&self, path: &Path) -> Result<Arc<dyn NativeLibrary>, LoadError> {
        Ok(Arc::new(Library::open(path)?))
    }
}

/// File name the OS loader searches for when a library is requested by bare name.
///
/// `platform_file_name("monosgen-2.0")` is `libmonosgen-2.0.so` on Linux.
pub fn platform_file_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.dll", name)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", name)
    } else {
        format!("lib{}.so", name)
    }
}

/// A shared library opened through the OS loader.
///
/// The OS handle is closed when the value is dropped.
pub struct Library {
    handle: OsHandle,
    path: String,
}

impl Library {
    /// Open the library at `path`; a bare file name goes through the loader's
    /// default search path.
    ///
    /// Unix resolves every symbol up front (`RTLD_NOW`) and keeps the runtime's
    /// exports private to this handle (`RTLD_LOCAL`). Windows uses
    /// `LoadLibraryW`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let path = path
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(path.display().to_string()))?;

        let raw = sys::open(path).map_err(|reason| LoadError::NotFound {
            path: format!("{}: {}", path, reason),
        })?;
        tracing::debug!(path, "opened native library");

        Ok(Library {
            handle: OsHandle(raw),
            path: path.to_string(),
        })
    }
}

impl NativeLibrary for Library {
    fn path(&self) -> &str {
        &self.path
    }

    fn raw_handle(&self) -> *mut c_void {
        self.handle.0
    }

    fn symbol(&self, name: &str) -> Result<*mut c_void, LoadError> {
        let not_found = |detail: Option<String>| LoadError::SymbolNotFound {
            symbol: name.to_string(),
            library: match detail {
                Some(detail) => format!("{}: {}", self.path, detail),
                None => self.path.clone(),
            },
        };
        let c_name = CString::new(name).map_err(|_| not_found(Some("symbol name contains NUL".into())))?;

        match sys::lookup(self.handle.0, &c_name) {
            Ok(address) if !address.is_null() => Ok(address),
            Ok(_) => Err(not_found(None)),
            Err(reason) => Err(not_found(Some(reason))),
        }
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path, "closing native library");
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("path", &self.path)
            .field("handle", &self.handle.0)
            .finish()
    }
}

/// Owned OS library handle.
struct OsHandle(*mut c_void);

impl Drop for OsHandle {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful `sys::open` and is closed once.
        unsafe { sys::close(self.0) };
    }
}

// SAFETY: the handle is only passed back to the OS loader, whose lookup and
// close calls may come from any thread.
unsafe impl Send for OsHandle {}
unsafe impl Sync for OsHandle {}

#[cfg(unix)]
mod sys {
    use std::ffi::{c_void, CStr, CString};

    /// `dlerror()` as an owned string, if one is pending.
    fn take_error() -> Option<String> {
        // SAFETY: dlerror returns null or a NUL-terminated thread-local message.
        let message = unsafe { libc::dlerror() };
        (!message.is_null()).then(|| unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned())
    }

    pub(super) fn open(path: &str) -> Result<*mut c_void, String> {
        let c_path = CString::new(path).map_err(|_| "path contains NUL".to_string())?;
        // SAFETY: c_path outlives the call.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(take_error().unwrap_or_else(|| "dlopen failed".to_string()));
        }
        Ok(handle)
    }

    /// A null address with no pending error is a symbol whose value is null.
    pub(super) fn lookup(handle: *mut c_void, name: &CStr) -> Result<*mut c_void, String> {
        take_error();
        // SAFETY: handle is a live dlopen handle and name is NUL-terminated.
        let address = unsafe { libc::dlsym(handle, name.as_ptr()) };
        match take_error() {
            Some(reason) => Err(reason),
            None => Ok(address),
        }
    }

    pub(super) unsafe fn close(handle: *mut c_void) {
        libc::dlclose(handle);
    }
}

#[cfg(windows)]
mod sys {
    use std::ffi::{c_void, CStr, OsStr};
    use std::os::raw::c_char;
    use std::os::windows::ffi::OsStrExt;

    extern "system" {
        fn LoadLibraryW(file_name: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, name: *const c_char) -> *mut c_void;
        fn FreeLibrary(module: *mut c_void) -> i32;
        fn GetLastError() -> u32;
    }

    pub(super) fn open(path: &str) -> Result<*mut c_void, String> {
        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(Some(0)).collect();
        // SAFETY: wide is NUL-terminated and outlives the call.
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            return Err(format!("LoadLibraryW failed with error {}", unsafe { GetLastError() }));
        }
        Ok(handle)
    }

    pub(super) fn lookup(handle: *mut c_void, name: &CStr) -> Result<*mut c_void, String> {
        // SAFETY: handle is a live module handle and name is NUL-terminated.
        let address = unsafe { GetProcAddress(handle, name.as_ptr()) };
        if address.is_null() {
            return Err(format!("GetProcAddress failed with error {}", unsafe { GetLastError() }));
        }
        Ok(address)
    }

    pub(super) unsafe fn close(handle: *mut c_void) {
        FreeLibrary(handle);
    }
}
