//! Oracle backed by the system libmagic, loaded at run time

use std::ffi::{CStr, CString};
use std::io;
#[cfg(unix)]
use std::os::unix::ffi::OsStrExt;
use std::os::raw::{c_char, c_int, c_void};
use std::path::Path;
use std::ptr;
use std::sync::Mutex;

use libloading::{Library, Symbol};
use log::debug;

use super::{ClassifyFlags, Oracle};
use crate::error::{Error, OracleError, Result};

type MagicOpenFn = unsafe extern "C" fn(c_int) -> *mut c_void;
type MagicCloseFn = unsafe extern "C" fn(*mut c_void);
type MagicLoadFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> c_int;
type MagicFileFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *const c_char;
type MagicErrorFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type MagicErrnoFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type MagicSetflagsFn = unsafe extern "C" fn(*mut c_void, c_int) -> c_int;

#[cfg(target_os = "macos")]
const LIBRARY_NAMES: &[&str] = &[
    "libmagic.1.dylib",
    "libmagic.dylib",
    "/opt/homebrew/lib/libmagic.1.dylib",
    "/usr/local/lib/libmagic.1.dylib",
    "/opt/local/lib/libmagic.1.dylib",
];
#[cfg(windows)]
const LIBRARY_NAMES: &[&str] = &["libmagic-1.dll", "magic1.dll", "magic.dll"];
#[cfg(not(any(target_os = "macos", windows)))]
const LIBRARY_NAMES: &[&str] = &["libmagic.so.1", "libmagic.so"];

struct MagicApi {
    open: MagicOpenFn,
    close: MagicCloseFn,
    load: MagicLoadFn,
    file: MagicFileFn,
    error: MagicErrorFn,
    errno: MagicErrnoFn,
    setflags: MagicSetflagsFn,
}

impl MagicApi {
    fn resolve(lib: &Library) -> std::result::Result<Self, OracleError> {
        unsafe {
            Ok(Self {
                open: symbol(lib, b"magic_open\0")?,
                close: symbol(lib, b"magic_close\0")?,
                load: symbol(lib, b"magic_load\0")?,
                file: symbol(lib, b"magic_file\0")?,
                error: symbol(lib, b"magic_error\0")?,
                errno: symbol(lib, b"magic_errno\0")?,
                setflags: symbol(lib, b"magic_setflags\0")?,
            })
        }
    }

    unsafe fn last_error(&self, cookie: *mut c_void) -> String {
        let msg = (self.error)(cookie);
        if msg.is_null() {
            return "unknown error".to_string();
        }
        CStr::from_ptr(msg).to_string_lossy().trim().to_string()
    }
}

unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> std::result::Result<T, OracleError> {
    let sym: Symbol<T> = lib.get(name).map_err(|e| {
        let printable = String::from_utf8_lossy(&name[..name.len() - 1]).into_owned();
        OracleError::Unavailable(format!("missing symbol {}: {}", printable, e))
    })?;
    Ok(*sym)
}

/// Bits the cookie always carries on top of what the caller asks for. Without `ERROR`,
/// libmagic reports an unreadable file as answer text instead of failing.
const ALWAYS: ClassifyFlags = ClassifyFlags::ERROR;

fn native_flags(flags: ClassifyFlags) -> c_int {
    (flags | ALWAYS).bits() as c_int
}

/// libmagic takes a NUL-terminated byte path.
#[cfg(unix)]
fn path_to_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> io::Result<CString> {
    let path = path
        .to_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path is not valid UTF-8"))?;
    CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// A magic cookie and the caller flags it was last configured with.
struct Cookie {
    raw: *mut c_void,
    flags: ClassifyFlags,
}

// The cookie is only touched while holding the oracle's mutex.
unsafe impl Send for Cookie {}

/// libmagic oracle.
///
/// One cookie is opened and its database loaded when the oracle is built; the cookie is closed
/// exactly once when the oracle is dropped. libmagic cookies keep their answer in an internal
/// buffer, so calls are serialized.
pub struct LibMagicOracle {
    cookie: Mutex<Cookie>,
    api: MagicApi,
    // Keeps the function pointers in `api` valid; dropped after `Drop::drop` closes the cookie.
    _lib: Library,
}

impl LibMagicOracle {
    /// Load libmagic (from `library`, or the platform's usual names) with its default database.
    pub fn open(library: Option<&Path>) -> std::result::Result<Self, OracleError> {
        Self::open_with_database(library, None)
    }

    pub fn open_with_database(
        library: Option<&Path>,
        database: Option<&Path>,
    ) -> std::result::Result<Self, OracleError> {
        let lib = load_library(library)?;
        let api = MagicApi::resolve(&lib)?;
        let flags = ClassifyFlags::RESOLVER_DEFAULT;

        let raw = unsafe { (api.open)(native_flags(flags)) };
        if raw.is_null() {
            return Err(OracleError::Native("open", io::Error::last_os_error().to_string()));
        }

        let database_c = match database {
            Some(db) => Some(path_to_cstring(db).map_err(|e| OracleError::Load(e.to_string()))?),
            None => None,
        };
        let database_ptr = database_c.as_ref().map_or(ptr::null(), |db| db.as_ptr());

        if unsafe { (api.load)(raw, database_ptr) } != 0 {
            let msg = unsafe { api.last_error(raw) };
            unsafe { (api.close)(raw) };
            return Err(OracleError::Load(msg));
        }

        debug!("libmagic loaded");
        Ok(Self {
            cookie: Mutex::new(Cookie { raw, flags }),
            api,
            _lib: lib,
        })
    }
}

fn load_library(library: Option<&Path>) -> std::result::Result<Library, OracleError> {
    if let Some(path) = library {
        return unsafe { Library::new(path) }
            .map_err(|e| OracleError::Unavailable(format!("failed to load {}: {}", path.display(), e)));
    }

    let mut last_err = None;
    for name in LIBRARY_NAMES {
        match unsafe { Library::new(*name) } {
            Ok(lib) => {
                debug!("using {}", name);
                return Ok(lib);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(OracleError::Unavailable(match last_err {
        Some(e) => format!("libmagic not found: {}", e),
        None => "libmagic not found".to_string(),
    }))
}

impl Oracle for LibMagicOracle {
    fn classify(&self, path: &Path, flags: ClassifyFlags) -> Result<String> {
        let path_c = path_to_cstring(path).map_err(|e| Error::io(path, e))?;

        let mut cookie = self
            .cookie
            .lock()
            .map_err(|_| OracleError::Native("file", "cookie lock poisoned".to_string()))?;

        if cookie.flags != flags {
            if unsafe { (self.api.setflags)(cookie.raw, native_flags(flags)) } != 0 {
                return Err(OracleError::Native("setflags", unsafe { self.api.last_error(cookie.raw) }).into());
            }
            cookie.flags = flags;
        }

        let mime = unsafe { (self.api.file)(cookie.raw, path_c.as_ptr()) };
        if mime.is_null() {
            let errno = unsafe { (self.api.errno)(cookie.raw) };
            if errno != 0 {
                return Err(Error::io(path, io::Error::from_raw_os_error(errno)));
            }
            return Err(OracleError::Native("file", unsafe { self.api.last_error(cookie.raw) }).into());
        }

        // Copy out before the lock is released; the next call overwrites the buffer.
        Ok(unsafe { CStr::from_ptr(mime) }.to_string_lossy().into_owned())
    }

    fn name(&self) -> &'static str {
        "libmagic"
    }
}

impl Drop for LibMagicOracle {
    fn drop(&mut self) {
        let cookie = match self.cookie.get_mut() {
            Ok(cookie) => cookie,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !cookie.raw.is_null() {
            unsafe { (self.api.close)(cookie.raw) };
            cookie.raw = ptr::null_mut();
        }
    }
}
