//! Error types for the hosting layer.

use std::ffi::NulError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the hosting layer
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors raised by the OS dynamic loader
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found or could not be loaded
    #[error("Library not found: {path}")]
    NotFound {
        /// Path that was attempted, with the loader's diagnostic
        path: String,
    },

    /// Symbol not found in library
    #[error("Symbol not found: {symbol} in {library}")]
    SymbolNotFound {
        /// Symbol name that was not found
        symbol: String,
        /// Library path
        library: String,
    },

    /// Platform-specific error
    #[error("Platform error: {0}")]
    PlatformError(String),

    /// Invalid path encoding
    #[error("Invalid UTF-8 in path: {0}")]
    InvalidPath(String),
}

/// Errors surfaced to callers of the coordinator and VM session
#[derive(Debug, Error)]
pub enum HostError {
    /// Library or assembly path does not exist
    #[error("File not found: {}", path.display())]
    FileNotFound {
        /// Missing path
        path: PathBuf,
    },

    /// Another runtime library path is still loaded
    #[error(
        "Already loaded runtime from another path: {} (requested {})",
        loaded.display(),
        requested.display()
    )]
    ConflictingLibraryPath {
        /// Path passed to the failed acquisition
        requested: PathBuf,
        /// Path currently held by live host handles
        loaded: PathBuf,
    },

    /// The OS loader rejected the runtime library
    #[error("Failed to load runtime library {}", path.display())]
    LibraryLoadFailed {
        /// Path that was attempted
        path: PathBuf,
        /// Loader diagnostic
        #[source]
        source: LoadError,
    },

    /// The runtime refused to open an assembly
    #[error("Failed to load assembly {path} (status {status})")]
    AssemblyOpenFailed {
        /// Assembly path as passed to the runtime
        path: String,
        /// Status code reported by the runtime
        status: i32,
    },

    /// An import could not be bound to a symbol
    #[error("Unresolved import {symbol} from {library}")]
    Unresolved {
        /// Library name the import was declared against
        library: String,
        /// Symbol name
        symbol: String,
        /// Loader diagnostic, when default resolution was attempted
        #[source]
        source: Option<LoadError>,
    },

    /// The linker already has an import resolver; registration is permanent
    #[error("Import resolver already installed; cannot install one for {library}")]
    ResolverAlreadyInstalled {
        /// Library name the rejected resolver would have served
        library: String,
    },

    /// A string passed across the native boundary contained a NUL byte
    #[error("String contains an interior NUL byte: {0}")]
    InvalidString(#[from] NulError),
}
