//! Monohost
//!
//! Hosts an embeddable Mono/CoreCLR runtime inside a native process: loads
//! the runtime's shared library on demand, routes the runtime's entry points
//! through an import resolver, and drives a VM through initialize, start,
//! open-assembly and execute.
//!
//! One runtime library load is shared by every live [`HostHandle`]; see
//! [`Coordinator`] for the lifecycle rules.

pub mod coordinator;
pub mod error;
pub mod library;
pub mod linker;
pub mod marshal;
pub mod resolver;
pub mod vm;

use std::path::Path;

pub use coordinator::{Coordinator, HostHandle, LibraryStatus};
pub use error::{HostError, LoadError, Result};
pub use library::{platform_file_name, Library, LibraryLoader, NativeLibrary, SystemLoader};
pub use linker::ImportLinker;
pub use marshal::NativeStrings;
pub use resolver::{RuntimeResolver, MONO_RUNTIME};
pub use vm::{AssemblyHandle, DomainHandle, EntryPoints, VmSession, NORMAL_VERSION};

/// Acquire a host for the runtime library at `lib_path` from the
/// process-wide coordinator.
///
/// Fails with [`HostError::FileNotFound`] if the file does not exist.
pub fn make(lib_path: impl AsRef<Path>) -> Result<HostHandle> {
    let lib_path = lib_path.as_ref();
    if !lib_path.is_file() {
        return Err(HostError::FileNotFound {
            path: lib_path.to_path_buf(),
        });
    }
    Coordinator::global().acquire(lib_path)
}
