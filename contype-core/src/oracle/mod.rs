//! Signature oracles: the classifiers a resolver consults

use std::env;
use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{OracleError, Result};

mod builtin;
mod libmagic;

pub use builtin::BuiltinOracle;
pub use libmagic::LibMagicOracle;

/// Environment variable selecting the shared oracle (`builtin`, `libmagic` or `auto`).
pub const ORACLE_ENV: &str = "CONTYPE_ORACLE";
/// Environment variable pointing at a specific libmagic shared object.
pub const MAGIC_LIBRARY_ENV: &str = "CONTYPE_MAGIC_LIBRARY";

/// Option bits passed to [`Oracle::classify`].
///
/// Values match libmagic's `MAGIC_*` constants so they can be handed to `magic_open` as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassifyFlags(u32);

impl ClassifyFlags {
    pub const NONE: Self = Self(0x0000);
    /// Follow symlinks and classify their target.
    pub const SYMLINK: Self = Self(0x0002);
    /// Report a MIME type instead of a textual description.
    pub const MIME_TYPE: Self = Self(0x0010);
    /// Restore the access time of the inspected file.
    pub const PRESERVE_ATIME: Self = Self(0x0080);
    /// Fail instead of describing an unreadable file in the answer text.
    pub const ERROR: Self = Self(0x0200);
    /// Report the MIME encoding (`charset=`).
    pub const MIME_ENCODING: Self = Self(0x0400);
    pub const MIME: Self = Self(Self::MIME_TYPE.0 | Self::MIME_ENCODING.0);

    /// What a resolver asks for: MIME type plus encoding, following links.
    pub const RESOLVER_DEFAULT: Self = Self(Self::SYMLINK.0 | Self::MIME.0 | Self::PRESERVE_ATIME.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for ClassifyFlags {
    fn default() -> Self {
        Self::RESOLVER_DEFAULT
    }
}

impl BitOr for ClassifyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A signature database that inspects a file and answers with a MIME string.
///
/// The raw answer may carry parameters (`text/plain; charset=us-ascii`); resolvers strip them.
/// Implementations must be deterministic for a given byte content and flag set, and safe to call
/// from several threads at once.
pub trait Oracle: Send + Sync {
    fn classify(&self, path: &Path, flags: ClassifyFlags) -> Result<String>;

    /// Short name for logs and the CLI.
    fn name(&self) -> &'static str;
}

pub type SharedOracle = Arc<dyn Oracle>;

/// Which oracle to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// Pure Rust signatures from the `infer` database.
    Builtin,
    /// The system libmagic, loaded at run time.
    LibMagic,
    /// libmagic when it loads, the builtin database otherwise.
    #[default]
    Auto,
}

impl FromStr for OracleKind {
    type Err = OracleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" | "infer" => Ok(OracleKind::Builtin),
            "libmagic" | "magic" => Ok(OracleKind::LibMagic),
            "auto" | "" => Ok(OracleKind::Auto),
            other => Err(OracleError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OracleKind::Builtin => "builtin",
            OracleKind::LibMagic => "libmagic",
            OracleKind::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Build an oracle of the requested kind.
///
/// `library` overrides the libmagic search path for `LibMagic` and `Auto`.
pub fn open(kind: OracleKind, library: Option<&Path>) -> std::result::Result<SharedOracle, OracleError> {
    match kind {
        OracleKind::Builtin => Ok(Arc::new(BuiltinOracle::new())),
        OracleKind::LibMagic => Ok(Arc::new(LibMagicOracle::open(library)?)),
        OracleKind::Auto => match LibMagicOracle::open(library) {
            Ok(magic) => Ok(Arc::new(magic)),
            Err(e) => {
                warn!("libmagic unavailable ({}), using builtin signatures", e);
                Ok(Arc::new(BuiltinOracle::new()))
            }
        },
    }
}

static SHARED: OnceLock<std::result::Result<SharedOracle, OracleError>> = OnceLock::new();

/// The process-wide oracle, built on first use from `CONTYPE_ORACLE` / `CONTYPE_MAGIC_LIBRARY`.
///
/// Initialization runs at most once; a failed initialization is remembered and returned to every
/// later caller.
pub fn shared() -> Result<SharedOracle> {
    let slot = SHARED.get_or_init(|| {
        let kind = match env::var(ORACLE_ENV) {
            Ok(value) => value.parse::<OracleKind>()?,
            Err(_) => OracleKind::default(),
        };
        let library = env::var_os(MAGIC_LIBRARY_ENV).map(PathBuf::from);
        let oracle = open(kind, library.as_deref())?;
        debug!("shared oracle initialized: {}", oracle.name());
        Ok(oracle)
    });

    Ok(slot.clone()?)
}
