//! Marshaling of string sequences across the native boundary.
//!
//! [`NativeStrings`] owns a NUL-terminated copy of every string together with
//! the pointer array the runtime reads. Both live until the value is dropped,
//! which frees them on every exit path, unwinding included.

use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use crate::error::Result;

/// NUL-terminated copies of a string sequence and an array pointing at them.
///
/// The pointer array carries one trailing null entry (the `argv` convention);
/// [`len`](Self::len) does not count it.
pub struct NativeStrings {
    buffers: Vec<CString>,
    pointers: Vec<*mut c_char>,
}

impl NativeStrings {
    /// Encode `strings` in order.
    ///
    /// Fails with [`HostError::InvalidString`](crate::HostError::InvalidString)
    /// if any string contains a NUL byte; nothing is leaked in that case.
    pub fn new<I, S>(strings: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let buffers = strings
            .into_iter()
            .map(|s| CString::new(s.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // A CString's heap buffer does not move with the CString, so these
        // stay valid while `buffers` is alive.
        let pointers = buffers
            .iter()
            .map(|s| s.as_ptr() as *mut c_char)
            .chain(std::iter::once(ptr::null_mut()))
            .collect();

        Ok(Self { buffers, pointers })
    }

    /// Number of strings.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether there are no strings.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Pointer to string `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn get(&self, index: usize) -> *const c_char {
        self.buffers[index].as_ptr()
    }

    /// The pointer array, for entry points taking `const char**`.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr() as *const *const c_char
    }

    /// The pointer array, for entry points taking `char**`.
    ///
    /// The runtime may permute the array but must not write through the
    /// string pointers.
    pub fn as_mut_ptr(&mut self) -> *mut *mut c_char {
        self.pointers.as_mut_ptr()
    }
}

impl std::fmt::Debug for NativeStrings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.buffers.iter()).finish()
    }
}
