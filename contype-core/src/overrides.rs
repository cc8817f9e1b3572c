//! Extension overrides for formats byte sniffing cannot tell apart

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Office Open XML and macro-enabled Office formats. All of them are ZIP containers, which a
/// signature database reports as a generic archive.
const OFFICE_OPEN_XML: &[(&str, &str)] = &[
    ("docm", "application/vnd.ms-word.document.macroEnabled.12"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("dotm", "application/vnd.ms-word.template.macroEnabled.12"),
    ("dotx", "application/vnd.openxmlformats-officedocument.wordprocessingml.template"),
    ("potm", "application/vnd.ms-powerpoint.template.macroEnabled.12"),
    ("potx", "application/vnd.openxmlformats-officedocument.presentationml.template"),
    ("ppam", "application/vnd.ms-powerpoint.addin.macroEnabled.12"),
    ("ppsm", "application/vnd.ms-powerpoint.slideshow.macroEnabled.12"),
    ("ppsx", "application/vnd.openxmlformats-officedocument.presentationml.slideshow"),
    ("pptm", "application/vnd.ms-powerpoint.presentation.macroEnabled.12"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("xlam", "application/vnd.ms-excel.addin.macroEnabled.12"),
    ("xlsb", "application/vnd.ms-excel.sheet.binary.macroEnabled.12"),
    ("xlsm", "application/vnd.ms-excel.sheet.macroEnabled.12"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("xltm", "application/vnd.ms-excel.template.macroEnabled.12"),
    ("xltx", "application/vnd.openxmlformats-officedocument.spreadsheetml.template"),
];

/// Extension to MIME type table consulted before the oracle.
///
/// Keys are stored lowercase without the leading dot, so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct OverrideTable {
    entries: BTreeMap<String, String>,
}

impl OverrideTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn office_open_xml() -> Self {
        OFFICE_OPEN_XML.iter().copied().collect()
    }

    /// Load a JSON object of `{"extension": "mime/type"}` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("override table {}: {}", path.display(), e)))
    }

    /// Add or replace an entry. Returns the previous MIME type for the extension.
    pub fn insert(&mut self, extension: &str, mime: impl Into<String>) -> Option<String> {
        self.entries.insert(normalize(extension), mime.into())
    }

    pub fn remove(&mut self, extension: &str) -> Option<String> {
        self.entries.remove(&normalize(extension))
    }

    pub fn get(&self, extension: &str) -> Option<&str> {
        self.entries.get(&normalize(extension)).map(String::as_str)
    }

    /// Override for a path, keyed on its final extension.
    ///
    /// Dotfiles such as `.docx` have no extension and never match.
    pub fn lookup(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.get(ext)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in extension order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add every entry of `other`, replacing clashes.
    pub fn extend_from(&mut self, other: &OverrideTable) {
        for (ext, mime) in other.iter() {
            self.insert(ext, mime);
        }
    }
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::office_open_xml()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for OverrideTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::empty();
        for (ext, mime) in iter {
            table.insert(ext.as_ref(), mime);
        }
        table
    }
}

impl From<BTreeMap<String, String>> for OverrideTable {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<OverrideTable> for BTreeMap<String, String> {
    fn from(table: OverrideTable) -> Self {
        table.entries
    }
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = OverrideTable::default();
        assert_eq!(table.len(), 17);
        assert_eq!(
            table.get("docx"),
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        );
        assert_eq!(table.get("zip"), None);
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let table = OverrideTable::default();
        assert_eq!(
            table.lookup(Path::new("/tmp/Report.XLSX")),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        );
        assert_eq!(table.lookup(Path::new("slides.pptx.bak")), None);
        assert_eq!(table.lookup(Path::new(".docx")), None);
        assert_eq!(table.lookup(Path::new("noext")), None);
    }

    #[test]
    fn test_insert_normalizes() {
        let mut table = OverrideTable::empty();
        assert!(table.is_empty());
        table.insert(".ODT", "application/vnd.oasis.opendocument.text");
        assert_eq!(table.get("odt"), Some("application/vnd.oasis.opendocument.text"));
        assert_eq!(
            table.remove("odt").as_deref(),
            Some("application/vnd.oasis.opendocument.text")
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_json_round_trip_keys_lowercase() {
        let table: OverrideTable =
            serde_json::from_str(r#"{"EPUB": "application/epub+zip", "jar": "application/java-archive"}"#)
                .unwrap();
        assert_eq!(table.get("epub"), Some("application/epub+zip"));

        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(
            json,
            r#"{"epub":"application/epub+zip","jar":"application/java-archive"}"#
        );
    }

    #[test]
    fn test_from_json_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("overrides.json");
        fs::write(&path, r#"{"apk": "application/vnd.android.package-archive"}"#)?;

        let table = OverrideTable::from_json_file(&path)?;
        assert_eq!(table.len(), 1);

        fs::write(&path, "not json")?;
        assert!(OverrideTable::from_json_file(&path).is_err());
        Ok(())
    }
}
