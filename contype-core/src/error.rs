//! Error types for content-type resolution

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The path did not name an existing entry when the resolver was built.
    #[error("invalid file: {}", path.display())]
    InvalidPath { path: PathBuf },

    /// The path existed once but could not be read when it was classified.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the classifier itself, as opposed to failures reading the file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("signature library unavailable: {0}")]
    Unavailable(String),

    #[error("magic_{0}() error: {1}")]
    Native(&'static str, String),

    #[error("signature database failed to load: {0}")]
    Load(String),

    #[error("unknown oracle kind: {0}")]
    UnknownKind(String),
}
