//! contype - MIME content types from file signatures

use anyhow::{bail, Context, Result};
use clap::Parser;
use contype_core::{oracle, ContentTypeResolver, OverrideTable, ResolverConfig, SharedOracle};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

mod cli;
use cli::{Cli, Commands};

#[derive(Debug, Serialize)]
struct Detection {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(load_config(cli.config.as_deref(), cli.overrides.as_deref())?);

    match cli.command {
        Commands::Detect { paths, json } => {
            let oracle = build_oracle(&cli.oracle, cli.magic_library.as_deref())?;
            let results: Vec<Detection> = paths
                .iter()
                .map(|path| detect(path, &oracle, &config))
                .collect();

            report(&results, json)?;
            check_failures(&results)
        }

        Commands::Scan {
            dir,
            max_depth,
            follow_links,
            summary,
            json,
        } => {
            let oracle = build_oracle(&cli.oracle, cli.magic_library.as_deref())?;

            let mut walker = WalkDir::new(&dir).follow_links(follow_links);
            if let Some(depth) = max_depth {
                walker = walker.max_depth(depth);
            }
            let mut files = Vec::new();
            for entry in walker {
                let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            info!("scanning {} files under {}", files.len(), dir.display());

            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"),
            );

            let mut results: Vec<Detection> = files
                .par_iter()
                .map(|path| {
                    let detection = detect(path, &oracle, &config);
                    pb.inc(1);
                    detection
                })
                .collect();
            pb.finish_and_clear();
            results.sort_by(|a, b| a.path.cmp(&b.path));

            if !summary {
                report(&results, json)?;
            }

            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for detection in &results {
                let key = detection.content_type.as_deref().unwrap_or("(error)");
                *counts.entry(key).or_default() += 1;
            }
            if json && summary {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else if !json {
                println!();
                println!("Summary: {} files", results.len());
                for (mime, count) in &counts {
                    println!("  {:>6}  {}", count, mime);
                }
            }

            check_failures(&results)
        }

        Commands::Overrides { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config.overrides)?);
            } else {
                for (ext, mime) in config.overrides.iter() {
                    println!("{:<6} {}", ext, mime);
                }
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_oracle(kind: &Option<oracle::OracleKind>, library: Option<&Path>) -> Result<SharedOracle> {
    let oracle = match kind {
        Some(kind) => oracle::open(*kind, library)
            .with_context(|| format!("Failed to open {} oracle", kind))?,
        None if library.is_some() => oracle::open(oracle::OracleKind::LibMagic, library)
            .context("Failed to open libmagic oracle")?,
        None => oracle::shared().context("Failed to open shared oracle")?,
    };
    debug!("using {} oracle", oracle.name());
    Ok(oracle)
}

fn load_config(config: Option<&Path>, overrides: Option<&Path>) -> Result<ResolverConfig> {
    let mut settings = match config {
        Some(path) => ResolverConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ResolverConfig::default(),
    };

    if let Some(path) = overrides {
        let extra = OverrideTable::from_json_file(path)
            .with_context(|| format!("Failed to load overrides {}", path.display()))?;
        settings.overrides.extend_from(&extra);
    }

    Ok(settings)
}

fn detect(path: &Path, oracle: &SharedOracle, config: &Arc<ResolverConfig>) -> Detection {
    let result = ContentTypeResolver::with_config(path, Arc::clone(oracle), Arc::clone(config))
        .and_then(|mut resolver| resolver.content_type().map(str::to_string));

    match result {
        Ok(mime) => Detection {
            path: path.to_path_buf(),
            content_type: Some(mime),
            error: None,
        },
        Err(e) => Detection {
            path: path.to_path_buf(),
            content_type: None,
            error: Some(e.to_string()),
        },
    }
}

fn report(results: &[Detection], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    for detection in results {
        match (&detection.content_type, &detection.error) {
            (Some(mime), _) => println!("{}: {}", detection.path.display(), mime),
            (None, Some(err)) => eprintln!("{}: error: {}", detection.path.display(), err),
            (None, None) => {}
        }
    }
    Ok(())
}

fn check_failures(results: &[Detection]) -> Result<()> {
    let failed = results.iter().filter(|d| d.error.is_some()).count();
    if failed > 0 {
        bail!("{} of {} paths could not be classified", failed, results.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_config_merges_overrides() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let extra = dir.path().join("extra.json");
        fs::write(&extra, r#"{"epub": "application/epub+zip"}"#)?;

        let settings = load_config(None, Some(&extra))?;
        assert_eq!(settings.overrides.get("epub"), Some("application/epub+zip"));
        assert!(settings.overrides.get("docx").is_some());
        Ok(())
    }

    #[test]
    fn test_detect_reports_errors() -> Result<()> {
        let oracle = oracle::open(oracle::OracleKind::Builtin, None)?;
        let config = Arc::new(ResolverConfig::default());

        let missing = detect(Path::new("poopstain"), &oracle, &config);
        assert!(missing.content_type.is_none());
        assert!(missing.error.as_deref().is_some_and(|e| e.contains("invalid file")));

        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "hello\n")?;
        let found = detect(&path, &oracle, &config);
        assert_eq!(found.content_type.as_deref(), Some("text/plain"));

        assert!(check_failures(&[missing, found]).is_err());
        Ok(())
    }
}
