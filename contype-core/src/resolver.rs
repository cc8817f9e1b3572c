//! Content-type resolution policy

use std::fmt;
use std::fs::{self, File, Metadata};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use log::debug;

use crate::config::ResolverConfig;
use crate::error::{Error, OracleError, Result};
use crate::oracle::{self, ClassifyFlags, SharedOracle};

/// Oracle answers that mean "could not tell".
const PLACEHOLDERS: &[&str] = &["application/octet-stream", "application/x-empty", "inode/x-empty"];

fn default_config() -> Arc<ResolverConfig> {
    static DEFAULT: OnceLock<Arc<ResolverConfig>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(ResolverConfig::default())).clone()
}

/// Resolves the MIME type of one path and remembers the answer.
///
/// The path is checked when the resolver is built; the oracle is only consulted on the first
/// call to [`content_type`](Self::content_type). After that the cached answer is returned for
/// the life of the resolver, even if the file changes on disk.
pub struct ContentTypeResolver {
    path: PathBuf,
    oracle: SharedOracle,
    config: Arc<ResolverConfig>,
    resolved: Option<String>,
}

impl ContentTypeResolver {
    pub fn new(path: impl Into<PathBuf>, oracle: SharedOracle) -> Result<Self> {
        Self::with_config(path, oracle, default_config())
    }

    pub fn with_config(
        path: impl Into<PathBuf>,
        oracle: SharedOracle,
        config: Arc<ResolverConfig>,
    ) -> Result<Self> {
        let path = path.into();
        ensure_exists(&path)?;

        Ok(Self {
            path,
            oracle,
            config,
            resolved: None,
        })
    }

    /// Build a resolver on the process-wide oracle.
    pub fn with_shared_oracle(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_exists(&path)?;
        Self::new(path, oracle::shared()?)
    }

    pub fn filepath(&self) -> &Path {
        &self.path
    }

    /// Whether the answer has been computed and cached.
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// The cached answer, if any, without resolving.
    pub fn cached(&self) -> Option<&str> {
        self.resolved.as_deref()
    }

    pub fn oracle(&self) -> &SharedOracle {
        &self.oracle
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The bare `type/subtype` for the path, resolved on first call and cached afterwards.
    pub fn content_type(&mut self) -> Result<&str> {
        let mime = match self.resolved.take() {
            Some(mime) => mime,
            None => {
                let mime = self.resolve()?;
                debug!("{}: {}", self.path.display(), mime);
                mime
            }
        };

        Ok(self.resolved.insert(mime).as_str())
    }

    fn resolve(&self) -> Result<String> {
        let meta = self.readable_metadata()?;

        // Overrides name file formats; directories and devices keep their inode type.
        if meta.is_file() {
            if let Some(mime) = self.config.overrides.lookup(&self.path) {
                debug!("{}: extension override {}", self.path.display(), mime);
                return Ok(mime.to_string());
            }
        }

        // Configured flags may add options but never turn MIME output off.
        let flags = self.config.flags | ClassifyFlags::MIME;
        let raw = self.oracle.classify(&self.path, flags)?;
        debug!("{}: {} says {:?}", self.path.display(), self.oracle.name(), raw);

        let guess = strip_parameters(&raw);
        if !is_media_type(guess) {
            return Err(OracleError::Native(
                "file",
                format!("not a MIME type for {}: {:?}", self.path.display(), raw),
            )
            .into());
        }

        Ok(self.apply_fallbacks(guess, &meta).to_string())
    }

    /// Re-check the path so a file lost or locked since construction reports as I/O, not as a
    /// classification failure.
    fn readable_metadata(&self) -> Result<Metadata> {
        let meta = fs::metadata(&self.path).map_err(|e| Error::io(&self.path, e))?;
        if meta.is_file() {
            File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        }
        Ok(meta)
    }

    fn apply_fallbacks<'a>(&'a self, guess: &'a str, meta: &Metadata) -> &'a str {
        if !PLACEHOLDERS.contains(&guess) {
            return guess;
        }
        if is_dotfile(&self.path) {
            return &self.config.text_default;
        }
        if meta.is_file() && meta.len() == 0 {
            return &self.config.empty_default;
        }
        guess
    }
}

impl fmt::Debug for ContentTypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTypeResolver")
            .field("path", &self.path)
            .field("oracle", &self.oracle.name())
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// One-shot lookup on the process-wide oracle.
pub fn content_type_of(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    ensure_exists(path)?;
    content_type_with(oracle::shared()?, path)
}

/// One-shot lookup on the given oracle.
pub fn content_type_with(oracle: SharedOracle, path: impl AsRef<Path>) -> Result<String> {
    let mut resolver = ContentTypeResolver::new(path.as_ref(), oracle)?;
    Ok(resolver.content_type()?.to_string())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || fs::metadata(path).is_err() {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// `type/subtype` part of a raw answer such as `text/plain; charset=us-ascii`.
fn strip_parameters(raw: &str) -> &str {
    raw.split_once(';').map_or(raw, |(mime, _)| mime).trim()
}

/// `type/subtype` with both halves present and no whitespace, e.g. not `PDF document, version 1.4`.
fn is_media_type(value: &str) -> bool {
    match value.split_once('/') {
        Some((kind, subtype)) => {
            !kind.is_empty()
                && !subtype.is_empty()
                && !value.contains(char::is_whitespace)
                && !subtype.contains('/')
        }
        None => false,
    }
}

/// Hidden file with no extension of its own, e.g. `.bashrc`.
fn is_dotfile(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    hidden && path.extension().is_none()
}
