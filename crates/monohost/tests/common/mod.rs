//! Shared fakes for the integration tests: a loader that counts loads and
//! unloads, and a runtime whose entry points record their arguments.
//!
//! Runtime behavior is configured per thread, since every entry point runs on
//! the calling thread.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int, c_uint};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use monohost::{LibraryLoader, LoadError, NativeLibrary};

// ============================================================================
// Loader
// ============================================================================

#[derive(Default)]
pub struct LoadCounters {
    pub loads: AtomicUsize,
    pub unloads: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

pub struct FakeLibrary {
    path: String,
    id: usize,
    counters: Arc<LoadCounters>,
}

impl NativeLibrary for FakeLibrary {
    fn path(&self) -> &str {
        &self.path
    }

    fn raw_handle(&self) -> *mut c_void {
        self.id as *mut c_void
    }

    fn symbol(&self, name: &str) -> Result<*mut c_void, LoadError> {
        let address = match name {
            "monovm_initialize" => fake_initialize as *mut c_void,
            "mono_jit_init_version" => fake_jit_init_version as *mut c_void,
            "mono_assembly_open" => fake_assembly_open as *mut c_void,
            "mono_jit_exec" => fake_jit_exec as *mut c_void,
            _ => {
                return Err(LoadError::SymbolNotFound {
                    symbol: name.to_string(),
                    library: self.path.clone(),
                })
            }
        };
        Ok(address)
    }
}

impl Drop for FakeLibrary {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Loader that fails for any path under `/missing`.
#[derive(Default)]
pub struct FakeLoader {
    pub counters: Arc<LoadCounters>,
    pub opened: parking_lot::Mutex<Vec<PathBuf>>,
}

impl FakeLoader {
    pub fn loads(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.counters.unloads.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }
}

impl LibraryLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Arc<dyn NativeLibrary>, LoadError> {
        if path.starts_with("/missing") {
            return Err(LoadError::NotFound {
                path: format!("{}: cannot open shared object file", path.display()),
            });
        }
        let n = self.counters.loads.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        self.opened.lock().push(path.to_path_buf());
        Ok(Arc::new(FakeLibrary {
            path: path.display().to_string(),
            id: 0x1000 * n,
            counters: self.counters.clone(),
        }))
    }
}

// ============================================================================
// Runtime
// ============================================================================

#[derive(Debug, Default)]
pub struct FakeRuntime {
    /// Pointer returned by mono_jit_init_version
    pub domain: usize,
    /// Pointer and status returned by mono_assembly_open
    pub assembly: usize,
    pub open_status: c_int,
    /// Value returned by mono_jit_exec
    pub exit_code: c_int,
    /// Entry point that panics instead of returning
    pub panic_in: Option<&'static str>,

    pub properties: Vec<(String, String)>,
    pub started: Option<(String, String)>,
    pub opened: Vec<String>,
    pub executed: Option<(usize, usize, Vec<String>)>,
}

thread_local! {
    static RUNTIME: RefCell<FakeRuntime> = RefCell::new(FakeRuntime::default());
}

pub fn with_runtime<R>(f: impl FnOnce(&mut FakeRuntime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

fn maybe_panic(entry: &'static str) {
    if with_runtime(|rt| rt.panic_in == Some(entry)) {
        panic!("runtime aborted");
    }
}

unsafe fn read(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe fn read_array(array: *const *const c_char, count: usize) -> Vec<String> {
    assert!((*array.add(count)).is_null(), "pointer array is not null-terminated");
    (0..count).map(|i| read(*array.add(i))).collect()
}

extern "C-unwind" fn fake_initialize(count: c_uint, keys: *const *const c_char, values: *const *const c_char) {
    maybe_panic("monovm_initialize");
    let (keys, values) = unsafe { (read_array(keys, count as usize), read_array(values, count as usize)) };
    with_runtime(|rt| rt.properties = keys.into_iter().zip(values).collect());
}

extern "C-unwind" fn fake_jit_init_version(name: *const c_char, version: *const c_char) -> *mut c_void {
    maybe_panic("mono_jit_init_version");
    let started = unsafe { (read(name), read(version)) };
    with_runtime(|rt| {
        rt.started = Some(started);
        rt.domain as *mut c_void
    })
}

extern "C-unwind" fn fake_assembly_open(name: *const c_char, status: *mut c_int) -> *mut c_void {
    maybe_panic("mono_assembly_open");
    let name = unsafe { read(name) };
    with_runtime(|rt| {
        rt.opened.push(name);
        unsafe { *status = rt.open_status };
        rt.assembly as *mut c_void
    })
}

extern "C-unwind" fn fake_jit_exec(domain: *mut c_void, assembly: *mut c_void, argc: c_int, argv: *mut *mut c_char) -> c_int {
    maybe_panic("mono_jit_exec");
    let args = unsafe { read_array(argv as *const *const c_char, argc as usize) };
    with_runtime(|rt| {
        rt.executed = Some((domain as usize, assembly as usize, args));
        rt.exit_code
    })
}
