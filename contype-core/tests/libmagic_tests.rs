//! End-to-end resolution against the system libmagic. Each test skips when libmagic is not
//! installed.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use contype_core::{
    content_type_with, ClassifyFlags, ContentTypeResolver, Error, LibMagicOracle, Oracle,
    ResolverConfig, SharedOracle,
};
use tempfile::TempDir;

const JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
    0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];
const PDF: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n";
const ZIP: &[u8] = &[
    b'P', b'K', 0x03, 0x04, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x21, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, b'a', b'.', b't',
    b'x', b't', 0x00, 0x00, 0x00,
];

fn libmagic() -> Option<SharedOracle> {
    match LibMagicOracle::open(None) {
        Ok(oracle) => Some(Arc::new(oracle)),
        Err(e) => {
            eprintln!("skipping, libmagic unavailable: {}", e);
            None
        }
    }
}

fn fixture(dir: &TempDir, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.path().join(name);
    fs::write(&path, data)?;
    Ok(path)
}

#[test]
fn test_libmagic_detects_images_and_pdfs() -> Result<()> {
    let Some(oracle) = libmagic() else { return Ok(()) };
    let dir = TempDir::new()?;
    let jpeg = fixture(&dir, "grindewald.jpg", JPEG)?;
    let pdf = fixture(&dir, "pdftest.pdf", PDF)?;

    assert_eq!(content_type_with(oracle.clone(), &jpeg)?, "image/jpeg");
    assert_eq!(content_type_with(oracle, &pdf)?, "application/pdf");
    Ok(())
}

#[test]
fn test_libmagic_empty_file() -> Result<()> {
    let Some(oracle) = libmagic() else { return Ok(()) };
    let dir = TempDir::new()?;
    let path = fixture(&dir, "empty.dat", b"")?;

    // libmagic says inode/x-empty
    assert_eq!(content_type_with(oracle, &path)?, "application/x-empty");
    Ok(())
}

#[test]
fn test_libmagic_unrecognized_dotfile() -> Result<()> {
    let Some(oracle) = libmagic() else { return Ok(()) };
    let dir = TempDir::new()?;
    let path = fixture(&dir, ".mystery", &[0x00, 0x01, 0x02, 0xFE, 0x80])?;

    assert_eq!(content_type_with(oracle, &path)?, "text/plain");
    Ok(())
}

#[test]
fn test_libmagic_docx_override() -> Result<()> {
    let Some(oracle) = libmagic() else { return Ok(()) };
    let dir = TempDir::new()?;
    let path = fixture(&dir, "x.docx", ZIP)?;

    assert_eq!(
        content_type_with(oracle, &path)?,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
    Ok(())
}

#[test]
fn test_libmagic_missing_file_is_io() -> Result<()> {
    let Some(oracle) = libmagic() else { return Ok(()) };
    let dir = TempDir::new()?;
    let path = fixture(&dir, "gone.pdf", PDF)?;

    let mut resolver = ContentTypeResolver::new(&path, oracle.clone())?;
    fs::remove_file(&path)?;
    assert!(matches!(resolver.content_type(), Err(Error::Io { .. })));
    assert!(!resolver.is_resolved());

    // Straight to the oracle, past the resolver's own check
    let err = oracle.classify(&path, ClassifyFlags::RESOLVER_DEFAULT).unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "got {:?}", err);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_libmagic_non_utf8_file_name() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let Some(oracle) = libmagic() else { return Ok(()) };
    let dir = TempDir::new()?;
    let path = dir.path().join(OsStr::from_bytes(b"caf\xE9.pdf"));
    fs::write(&path, PDF)?;

    assert_eq!(content_type_with(oracle, &path)?, "application/pdf");
    Ok(())
}

#[test]
fn test_libmagic_flags_without_mime_output() -> Result<()> {
    let Some(oracle) = libmagic() else { return Ok(()) };
    let dir = TempDir::new()?;
    let path = fixture(&dir, "pdftest.pdf", PDF)?;

    let config: ResolverConfig = serde_json::from_str(r#"{"flags": 2}"#)?;
    let mut resolver = ContentTypeResolver::with_config(&path, oracle, Arc::new(config))?;
    assert_eq!(resolver.content_type()?, "application/pdf");
    Ok(())
}
