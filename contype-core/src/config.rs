//! Resolver settings

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::oracle::ClassifyFlags;
use crate::overrides::OverrideTable;

pub const TEXT_DEFAULT: &str = "text/plain";
pub const EMPTY_DEFAULT: &str = "application/x-empty";

/// Settings applied by a [`ContentTypeResolver`](crate::ContentTypeResolver).
///
/// Every field is optional in JSON; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Extensions whose type is fixed regardless of content.
    pub overrides: OverrideTable,

    /// Answer for dotfiles the oracle could not classify.
    pub text_default: String,

    /// Answer for zero-length files.
    pub empty_default: String,

    /// Flags passed to the oracle. MIME output is always requested on top of these.
    pub flags: ClassifyFlags,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            overrides: OverrideTable::default(),
            text_default: TEXT_DEFAULT.to_string(),
            empty_default: EMPTY_DEFAULT.to_string(),
            flags: ClassifyFlags::default(),
        }
    }
}

impl ResolverConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }
}
