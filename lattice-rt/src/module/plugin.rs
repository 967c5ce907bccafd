//! Module images and entry points.
//!
//! A module is either a dynamically loaded image exposing the fixed-name
//! `module_main` symbol, or a built-in entry function compiled into the
//! broker. Both run on the module's worker thread with the same contract: a
//! non-`Ok` return is an abnormal exit whose error number is published with
//! the terminal status.

// Layer 1: Standard library imports
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::Path;

// Layer 2: Third-party crate imports
use libloading::{Library, Symbol};
use thiserror::Error;

// Layer 3: Internal module imports
use super::error::ModuleError;
use crate::handle::{HandleError, ModuleHandle};
use crate::util::errnum;

/// Entry-point symbol every loadable module image must define.
pub const ENTRY_SYMBOL: &[u8] = b"module_main";

/// Optional legacy name symbol. If an image defines it, its value must equal
/// the module's canonical name.
pub const LEGACY_NAME_SYMBOL: &[u8] = b"module_name";

/// Failure returned by a native module entry point.
///
/// Carries the wire error number published with the EXITED status. A zero
/// error number on a failed entry is reported as `ECONNRESET` by the runtime
/// shim, so `?`-propagated handle errors always surface meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("module main failed with errnum {errnum}")]
pub struct ModuleMainError {
    /// Wire error number describing the failure.
    pub errnum: i32,
}

impl ModuleMainError {
    /// Failure with an explicit error number.
    pub fn new(errnum: i32) -> Self {
        Self { errnum }
    }
}

impl From<HandleError> for ModuleMainError {
    fn from(err: HandleError) -> Self {
        Self {
            errnum: err.errnum(),
        }
    }
}

/// Native (compiled-in) module entry point.
pub type ModuleEntry = fn(&mut ModuleHandle, &[String]) -> Result<(), ModuleMainError>;

/// C ABI of the `module_main` symbol in loadable images.
pub type RawModuleEntry =
    unsafe extern "C" fn(handle: *mut ModuleHandle, argc: c_int, argv: *const *const c_char) -> c_int;

/// A loaded module image plus its resolved entry point.
pub enum ModuleImage {
    /// Built-in module compiled into the broker.
    Native {
        /// The entry function.
        entry: ModuleEntry,
    },
    /// Dynamically loaded image. The library stays resident until the
    /// record is dropped; the entry symbol is re-resolved at invoke time so
    /// the image owns no self-references.
    Dylib {
        /// The loaded library.
        lib: Library,
    },
}

impl std::fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native { .. } => f.write_str("ModuleImage::Native"),
            Self::Dylib { .. } => f.write_str("ModuleImage::Dylib"),
        }
    }
}

impl ModuleImage {
    /// Wrap a built-in entry function.
    pub fn native(entry: ModuleEntry) -> Self {
        Self::Native { entry }
    }

    /// Load an image from `path` and validate its entry point.
    ///
    /// Returns the image together with the value of the legacy name symbol,
    /// if the image defines one. Fails with *not found* if the image cannot
    /// be loaded and *invalid argument* if `module_main` is missing; in both
    /// cases the image is unloaded.
    pub fn load(path: &Path) -> Result<(Self, Option<String>), ModuleError> {
        let lib = open_library(path).map_err(|e| ModuleError::NotFound {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Resolve the entry point now so a bad image fails at create time.
        unsafe {
            if lib.get::<RawModuleEntry>(ENTRY_SYMBOL).is_err() {
                return Err(ModuleError::InvalidArgument(
                    "module does not define module_main()".to_string(),
                ));
            }
        }
        let legacy_name = unsafe { read_legacy_name(&lib) };
        Ok((Self::Dylib { lib }, legacy_name))
    }

    /// Run the entry point on the current (worker) thread.
    ///
    /// Returns the wire error number of the exit: 0 for a clean return, the
    /// entry's error number otherwise, with zero-errno failures mapped to
    /// `ECONNRESET`.
    pub(crate) fn invoke(&self, handle: &mut ModuleHandle, args: &[String]) -> i32 {
        match self {
            Self::Native { entry } => match entry(handle, args) {
                Ok(()) => 0,
                Err(e) if e.errnum == 0 => errnum::ECONNRESET,
                Err(e) => e.errnum,
            },
            Self::Dylib { lib } => invoke_dylib(lib, handle, args),
        }
    }
}

fn invoke_dylib(lib: &Library, handle: &mut ModuleHandle, args: &[String]) -> i32 {
    let entry: Symbol<'_, RawModuleEntry> = match unsafe { lib.get(ENTRY_SYMBOL) } {
        Ok(sym) => sym,
        Err(_) => return errnum::EINVAL,
    };
    let cargs: Vec<CString> = args
        .iter()
        .filter_map(|a| CString::new(a.as_str()).ok())
        .collect();
    let mut argv: Vec<*const c_char> = cargs.iter().map(|a| a.as_ptr()).collect();
    argv.push(std::ptr::null());

    let rc = unsafe { entry(handle as *mut ModuleHandle, cargs.len() as c_int, argv.as_ptr()) };
    if rc >= 0 {
        return 0;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(0) | None => errnum::ECONNRESET,
        Some(e) => e,
    }
}

/// Read the optional legacy `module_name` symbol from a loaded image.
unsafe fn read_legacy_name(lib: &Library) -> Option<String> {
    let sym: Symbol<'_, *const c_char> = lib.get(LEGACY_NAME_SYMBOL).ok()?;
    let ptr: *const c_char = *sym;
    if ptr.is_null() {
        return None;
    }
    let cstr = std::ffi::CStr::from_ptr(ptr);
    cstr.to_str().ok().map(str::to_string)
}

/// Derive the canonical module name from an image path: the basename with
/// everything from the first `.so` onward stripped.
pub fn name_from_path(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = match name.find(".so") {
        Some(pos) => &name[..pos],
        None => name,
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(all(unix, target_os = "linux"))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    // Deep-binding local-global resolution: symbols resolve within the
    // image first, then globally.
    let flags = RTLD_NOW | RTLD_GLOBAL | libc::RTLD_DEEPBIND;
    unsafe { UnixLibrary::open(Some(path), flags).map(Into::into) }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL).map(Into::into) }
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}
