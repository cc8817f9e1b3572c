//! Pure Rust oracle backed by the `infer` signature database

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use log::debug;

use super::{ClassifyFlags, Oracle};
use crate::error::{Error, Result};

/// Bytes inspected per file; `infer` signatures all sit well inside this window.
const SNIFF_LEN: u64 = 8192;

/// Oracle that needs no system library.
///
/// Special entries are reported with libmagic's `inode/*` names without being opened. Regular
/// files are matched against `infer`; unmatched content falls back to a text check.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinOracle;

impl BuiltinOracle {
    pub fn new() -> Self {
        Self
    }

    /// Classify an in-memory prefix of a file.
    pub fn classify_bytes(&self, data: &[u8], flags: ClassifyFlags) -> String {
        let (mime, charset) = if data.is_empty() {
            ("application/x-empty", "binary")
        } else if let Some(kind) = infer::get(data) {
            let mime = kind.mime_type();
            let charset = if mime.starts_with("text/") {
                text_charset(data).unwrap_or("binary")
            } else {
                "binary"
            };
            (mime, charset)
        } else {
            match text_charset(data) {
                Some(charset) => ("text/plain", charset),
                None => ("application/octet-stream", "binary"),
            }
        };

        with_encoding(mime, charset, flags)
    }

    fn read_prefix(path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut data = Vec::with_capacity(SNIFF_LEN as usize);
        file.take(SNIFF_LEN)
            .read_to_end(&mut data)
            .map_err(|e| Error::io(path, e))?;
        Ok(data)
    }
}

impl Oracle for BuiltinOracle {
    fn classify(&self, path: &Path, flags: ClassifyFlags) -> Result<String> {
        let meta = if flags.contains(ClassifyFlags::SYMLINK) {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
        .map_err(|e| Error::io(path, e))?;

        if let Some(inode) = special_entry(&meta.file_type()) {
            debug!("{}: special entry {}", path.display(), inode);
            return Ok(with_encoding(inode, "binary", flags));
        }

        let data = Self::read_prefix(path)?;
        Ok(self.classify_bytes(&data, flags))
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}

fn special_entry(file_type: &fs::FileType) -> Option<&'static str> {
    if file_type.is_dir() {
        return Some("inode/directory");
    }
    if file_type.is_symlink() {
        return Some("inode/symlink");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        if file_type.is_fifo() {
            return Some("inode/fifo");
        }
        if file_type.is_socket() {
            return Some("inode/socket");
        }
        if file_type.is_char_device() {
            return Some("inode/chardevice");
        }
        if file_type.is_block_device() {
            return Some("inode/blockdevice");
        }
    }

    None
}

/// Charset of text content, or `None` when the bytes look binary.
fn text_charset(data: &[u8]) -> Option<&'static str> {
    let printable = |b: u8| matches!(b, 0x20..=0x7E | b'\t' | b'\n' | b'\r' | 0x0C | 0x1B | 0x08);

    if data.iter().all(|&b| printable(b)) {
        return Some("us-ascii");
    }

    // A multi-byte sequence cut off by the sniff window is still UTF-8.
    let valid = match std::str::from_utf8(data) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    if valid && data.iter().all(|&b| b >= 0x80 || printable(b)) {
        return Some("utf-8");
    }

    None
}

fn with_encoding(mime: &str, charset: &str, flags: ClassifyFlags) -> String {
    if flags.contains(ClassifyFlags::MIME_ENCODING) {
        format!("{}; charset={}", mime, charset)
    } else {
        mime.to_string()
    }
}
