//! VM session: the runtime's embedding entry points.
//!
//! A session is bound to a [`HostHandle`] and cannot outlive it. It holds
//! no state beyond the bound entry points; domain and assembly handles are
//! threaded through by the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! let host = monohost::make("/app/libmonosgen-2.0.so")?;
//! let vm = host.vm()?;
//! vm.initialize(&[("TRUSTED_PLATFORM_ASSEMBLIES", tpa.as_str())])?;
//! let domain = vm.start("mono_in_core", monohost::NORMAL_VERSION)?;
//! let assembly = vm.open_assembly(domain, "/app/InnerApp.dll")?;
//! let exit_code = vm.execute(domain, assembly, &["hi"])?;
//! ```

use std::ffi::c_void;
use std::os::raw::{c_char, c_int, c_uint};
use std::ptr::NonNull;

use crate::coordinator::HostHandle;
use crate::error::{HostError, Result};
use crate::linker::ImportLinker;
use crate::marshal::NativeStrings;
use crate::resolver::MONO_RUNTIME;

/// Runtime version passed to `mono_jit_init_version` for normal operation.
pub const NORMAL_VERSION: &str = "v4.0.30319";

/// `void monovm_initialize(uint32_t nprops, const char** keys, const char** values)`
pub type InitializeFn = unsafe extern "C-unwind" fn(c_uint, *const *const c_char, *const *const c_char);

/// `MonoDomain* mono_jit_init_version(const char* name, const char* version)`
pub type JitInitVersionFn = unsafe extern "C-unwind" fn(*const c_char, *const c_char) -> *mut c_void;

/// `MonoAssembly* mono_assembly_open(const char* name, int* status)`
pub type AssemblyOpenFn = unsafe extern "C-unwind" fn(*const c_char, *mut c_int) -> *mut c_void;

/// `int mono_jit_exec(MonoDomain* domain, MonoAssembly* assembly, int argc, char** argv)`
pub type JitExecFn = unsafe extern "C-unwind" fn(*mut c_void, *mut c_void, c_int, *mut *mut c_char) -> c_int;

/// Entry points the session drives, bound by name through the linker.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    initialize: InitializeFn,
    jit_init_version: JitInitVersionFn,
    assembly_open: AssemblyOpenFn,
    jit_exec: JitExecFn,
}

impl EntryPoints {
    /// Exported symbol names, in binding order.
    pub const SYMBOLS: [&'static str; 4] = [
        "monovm_initialize",
        "mono_jit_init_version",
        "mono_assembly_open",
        "mono_jit_exec",
    ];

    /// Bind every entry point declared against [`MONO_RUNTIME`].
    pub fn bind(linker: &ImportLinker) -> Result<Self> {
        // SAFETY: each type alias matches the exported C signature.
        unsafe {
            Ok(Self {
                initialize: linker.import(MONO_RUNTIME, Self::SYMBOLS[0])?,
                jit_init_version: linker.import(MONO_RUNTIME, Self::SYMBOLS[1])?,
                assembly_open: linker.import(MONO_RUNTIME, Self::SYMBOLS[2])?,
                jit_exec: linker.import(MONO_RUNTIME, Self::SYMBOLS[3])?,
            })
        }
    }
}

impl std::fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoints")
            .field("initialize", &(self.initialize as *const c_void))
            .field("jit_init_version", &(self.jit_init_version as *const c_void))
            .field("assembly_open", &(self.assembly_open as *const c_void))
            .field("jit_exec", &(self.jit_exec as *const c_void))
            .finish()
    }
}

/// Execution context returned by `mono_jit_init_version`.
///
/// May be null: the runtime's failure signal is passed through as-is and
/// must be checked with [`is_null`](Self::is_null) before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainHandle(*mut c_void);

impl DomainHandle {
    /// Wrap a raw domain pointer.
    pub fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// The raw pointer.
    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    /// Whether the runtime failed to produce a domain.
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

/// Loaded assembly returned by `mono_assembly_open`. Never null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyHandle(NonNull<c_void>);

impl AssemblyHandle {
    /// The raw pointer.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Entry points bound against one host handle's runtime load.
pub struct VmSession<'h> {
    entry: EntryPoints,
    _host: &'h HostHandle,
}

impl<'h> VmSession<'h> {
    pub(crate) fn bind(host: &'h HostHandle) -> Result<Self> {
        let entry = EntryPoints::bind(host.coordinator().linker())?;
        Ok(Self { entry, _host: host })
    }

    /// Entry points this session calls.
    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry
    }

    /// Pass initialization properties to the runtime, in order.
    ///
    /// The runtime reports no failure through this entry point; only a
    /// string that cannot be marshaled is an error.
    pub fn initialize<K, V>(&self, properties: &[(K, V)]) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let keys = NativeStrings::new(properties.iter().map(|(k, _)| k.as_ref()))?;
        let values = NativeStrings::new(properties.iter().map(|(_, v)| v.as_ref()))?;
        tracing::debug!(count = keys.len(), "monovm_initialize");

        // SAFETY: both arrays hold `keys.len()` valid C strings and outlive the call.
        unsafe {
            (self.entry.initialize)(keys.len() as c_uint, keys.as_ptr(), values.as_ptr());
        }
        Ok(())
    }

    /// Create the root domain.
    ///
    /// A null domain is returned as-is; see [`DomainHandle::is_null`].
    pub fn start(&self, name: &str, version: &str) -> Result<DomainHandle> {
        let strings = NativeStrings::new([name, version])?;
        tracing::debug!(name, version, "mono_jit_init_version");

        // SAFETY: both pointers are valid C strings for the duration of the call.
        let domain = DomainHandle(unsafe { (self.entry.jit_init_version)(strings.get(0), strings.get(1)) });
        if domain.is_null() {
            tracing::warn!(name, version, "runtime returned a null domain");
        }
        Ok(domain)
    }

    /// Open the assembly at `path` into the runtime.
    ///
    /// Fails with [`HostError::AssemblyOpenFailed`] when the runtime reports a
    /// non-zero status or returns no assembly.
    pub fn open_assembly(&self, _domain: DomainHandle, path: &str) -> Result<AssemblyHandle> {
        let strings = NativeStrings::new([path])?;
        let mut status: c_int = 0;

        // SAFETY: the path is a valid C string and `status` is a live out-parameter.
        let raw = unsafe { (self.entry.assembly_open)(strings.get(0), &mut status) };
        match NonNull::new(raw) {
            Some(ptr) if status == 0 => {
                tracing::debug!(path, "opened assembly");
                Ok(AssemblyHandle(ptr))
            }
            _ => {
                tracing::warn!(path, status, "failed to open assembly");
                Err(HostError::AssemblyOpenFailed {
                    path: path.to_string(),
                    status,
                })
            }
        }
    }

    /// Run the assembly's entry point with `argv`; returns its exit code unmodified.
    pub fn execute<S: AsRef<str>>(&self, domain: DomainHandle, assembly: AssemblyHandle, argv: &[S]) -> Result<i32> {
        let mut args = NativeStrings::new(argv)?;
        tracing::debug!(argc = args.len(), "mono_jit_exec");

        // SAFETY: `args` holds `args.len()` valid C strings plus a null
        // terminator, and outlives the call.
        let code = unsafe { (self.entry.jit_exec)(domain.as_ptr(), assembly.as_ptr(), args.len() as c_int, args.as_mut_ptr()) };
        Ok(code)
    }
}

impl std::fmt::Debug for VmSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmSession").field("entry", &self.entry).finish()
    }
}
