//! Content-type resolution for files on disk.
//!
//! A [`ContentTypeResolver`] asks a signature [`Oracle`] what a file is, trims the answer to a
//! bare `type/subtype`, applies extension and placeholder overrides, and remembers the result.

pub mod config;
pub mod error;
pub mod oracle;
pub mod overrides;
pub mod resolver;

// Re-exports
pub use config::ResolverConfig;
pub use error::{Error, OracleError, Result};
pub use oracle::{BuiltinOracle, ClassifyFlags, LibMagicOracle, Oracle, OracleKind, SharedOracle};
pub use overrides::OverrideTable;
pub use resolver::{content_type_of, content_type_with, ContentTypeResolver};
