//! Command-line interface for contype

use clap::{ArgAction, Parser, Subcommand};
use contype_core::OracleKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "contype")]
#[command(about = "contype - MIME content types from file signatures", long_about = None)]
pub struct Cli {
    /// Signature oracle: builtin, libmagic or auto (default: $CONTYPE_ORACLE, then auto)
    #[arg(long, global = true)]
    pub oracle: Option<OracleKind>,

    /// Path to a libmagic shared library
    #[arg(long, global = true)]
    pub magic_library: Option<PathBuf>,

    /// Resolver settings (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extra extension overrides (JSON object of extension -> MIME type)
    #[arg(long, global = true)]
    pub overrides: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the content type of each path
    Detect {
        /// Files or directories to classify
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify every file under a directory
    Scan {
        /// Directory to walk
        dir: PathBuf,

        /// Maximum directory depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Follow symbolic links while walking
        #[arg(long)]
        follow_links: bool,

        /// Only print the per-type summary
        #[arg(long)]
        summary: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the extension override table in effect
    Overrides {
        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },
}
