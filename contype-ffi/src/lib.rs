use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

use contype_core::{content_type_of, ContentTypeResolver, OverrideTable};

// Global error message storage (mutable)
static LAST_ERROR: Mutex<Option<CString>> = Mutex::new(None);

/// Resolver owned by the host. Mirrors the host-side `ContentType` object: a path, a
/// `processed` flag and the memoized answer.
pub struct ContentTypeHandle {
    resolver: ContentTypeResolver,
    filepath: CString,
    content_type: Option<CString>,
}

fn set_last_error(error: String) {
    if let Ok(mut guard) = LAST_ERROR.lock() {
        *guard = CString::new(error).ok();
    }
}

fn get_last_error_ptr() -> *const c_char {
    if let Ok(guard) = LAST_ERROR.lock() {
        if let Some(ref msg) = *guard {
            return msg.as_ptr();
        }
    }
    ptr::null()
}

/// Run `f`, turning errors and panics into a last-error message and `None`.
fn guarded<T>(what: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            set_last_error(format!("{}: {:#}", what, e));
            None
        }
        Err(_) => {
            set_last_error(format!("{}: panicked", what));
            None
        }
    }
}

unsafe fn path_arg<'a>(path: *const c_char) -> Result<&'a str> {
    if path.is_null() {
        return Err(anyhow!("null path"));
    }
    CStr::from_ptr(path).to_str().context("path is not valid UTF-8")
}

/// Create a resolver for `file_path`. Returns null and sets the last error when the path does
/// not exist. Release with `ContentTypeFree`.
#[export_name = "ContentTypeNew"]
pub unsafe extern "C" fn ContentTypeNew(file_path: *const c_char) -> *mut ContentTypeHandle {
    let handle = guarded("ContentTypeNew", || {
        let path = path_arg(file_path)?;
        let resolver = ContentTypeResolver::with_shared_oracle(path)?;
        Ok(Box::new(ContentTypeHandle {
            resolver,
            filepath: CString::new(path)?,
            content_type: None,
        }))
    });

    handle.map_or(ptr::null_mut(), Box::into_raw)
}

/// MIME type of the handle's file, resolved once. The string stays valid until the handle is
/// freed. Returns null and sets the last error on failure.
#[export_name = "ContentTypeGet"]
pub unsafe extern "C" fn ContentTypeGet(handle: *mut ContentTypeHandle) -> *const c_char {
    let Some(handle) = handle.as_mut() else {
        set_last_error("Null handle passed to ContentTypeGet".to_string());
        return ptr::null();
    };

    if handle.content_type.is_none() {
        let resolved = guarded("ContentTypeGet", || {
            let mime = handle.resolver.content_type()?;
            Ok(CString::new(mime)?)
        });
        match resolved {
            Some(mime) => handle.content_type = Some(mime),
            None => return ptr::null(),
        }
    }

    handle.content_type.as_ref().map_or(ptr::null(), |mime| mime.as_ptr())
}

#[export_name = "ContentTypeFilepath"]
pub unsafe extern "C" fn ContentTypeFilepath(handle: *const ContentTypeHandle) -> *const c_char {
    match handle.as_ref() {
        Some(handle) => handle.filepath.as_ptr(),
        None => ptr::null(),
    }
}

/// Whether `ContentTypeGet` has already resolved the handle.
#[export_name = "ContentTypeProcessed"]
pub unsafe extern "C" fn ContentTypeProcessed(handle: *const ContentTypeHandle) -> bool {
    handle.as_ref().is_some_and(|handle| handle.resolver.is_resolved())
}

#[export_name = "ContentTypeFree"]
pub unsafe extern "C" fn ContentTypeFree(handle: *mut ContentTypeHandle) {
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle));
}

/// One-shot lookup. The caller owns the result and releases it with `FreeCString`.
#[export_name = "ContentTypeOf"]
pub unsafe extern "C" fn ContentTypeOf(file_path: *const c_char) -> *mut c_char {
    let mime = guarded("ContentTypeOf", || {
        let path = path_arg(file_path)?;
        Ok(CString::new(content_type_of(path)?)?)
    });

    mime.map_or(ptr::null_mut(), CString::into_raw)
}

/// Default extension override table as a JSON object. Release with `FreeCString`.
#[export_name = "ContentTypeOverridesJson"]
pub unsafe extern "C" fn ContentTypeOverridesJson() -> *mut c_char {
    let json = guarded("ContentTypeOverridesJson", || {
        let json = serde_json::to_string(&OverrideTable::default())?;
        Ok(CString::new(json)?)
    });

    json.map_or(ptr::null_mut(), CString::into_raw)
}

/// Message from the most recent failing call, or null if none has failed.
///
/// The pointer is owned by the library and stays valid only until the next failing call on any
/// thread, which replaces the message. Copy it out before calling in again; do not free it.
#[export_name = "GetContentTypeError"]
pub unsafe extern "C" fn GetContentTypeError() -> *const c_char {
    get_last_error_ptr()
}

#[export_name = "FreeCString"]
pub unsafe extern "C" fn FreeCString(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    let _ = CString::from_raw(ptr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn c_path(path: &std::path::Path) -> CString {
        CString::new(path.to_str().unwrap()).unwrap()
    }

    unsafe fn owned(ptr: *const c_char) -> String {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }

    #[test]
    fn test_handle_lifecycle() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pdftest.pdf");
        fs::write(&path, b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\ntrailer\n<< >>\n%%EOF\n").unwrap();
        let path_c = c_path(&path);

        unsafe {
            let handle = ContentTypeNew(path_c.as_ptr());
            assert!(!handle.is_null());
            assert_eq!(owned(ContentTypeFilepath(handle)), path.to_str().unwrap());
            assert!(!ContentTypeProcessed(handle));

            let first = ContentTypeGet(handle);
            assert_eq!(owned(first), "application/pdf");
            assert!(ContentTypeProcessed(handle));

            // Memoized answers hand back the same buffer
            assert_eq!(ContentTypeGet(handle), first);
            ContentTypeFree(handle);
        }
    }

    // Tests that read the last error hold this so they see their own message
    static ERROR_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_invalid_path_sets_error() {
        let _serial = ERROR_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let path_c = CString::new("poopstain").unwrap();
        unsafe {
            assert!(ContentTypeNew(path_c.as_ptr()).is_null());
            let err = owned(GetContentTypeError());
            assert!(err.contains("invalid file"), "got {}", err);

            assert!(ContentTypeOf(ptr::null()).is_null());
            assert!(ContentTypeGet(ptr::null_mut()).is_null());
            assert!(!ContentTypeProcessed(ptr::null()));
            ContentTypeFree(ptr::null_mut());
        }
    }

    #[test]
    fn test_last_error_replaced_by_next_failure() {
        let _serial = ERROR_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let first = CString::new("/nonexistent/first.bin").unwrap();
        let second = CString::new("/nonexistent/second.bin").unwrap();

        unsafe {
            assert!(ContentTypeOf(first.as_ptr()).is_null());
            let copied = owned(GetContentTypeError());
            assert!(copied.contains("first.bin"), "got {}", copied);

            assert!(ContentTypeNew(second.as_ptr()).is_null());
            let replaced = owned(GetContentTypeError());
            assert!(replaced.contains("second.bin"), "got {}", replaced);
            // The copy taken earlier is unaffected
            assert!(copied.contains("first.bin"));
        }
    }

    #[test]
    fn test_content_type_of_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        fs::write(&path, b"PK\x03\x04").unwrap();
        let path_c = c_path(&path);

        unsafe {
            let mime = ContentTypeOf(path_c.as_ptr());
            assert!(!mime.is_null());
            assert_eq!(
                owned(mime),
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            );
            FreeCString(mime);
        }
    }

    #[test]
    fn test_overrides_json() {
        unsafe {
            let json = ContentTypeOverridesJson();
            let table: OverrideTable = serde_json::from_str(&owned(json)).unwrap();
            assert_eq!(table, OverrideTable::default());
            FreeCString(json);
        }
    }
}
