//! `docshelf ingest`: a file or a directory tree.
//!
//! Directories are walked with `walkdir` and filtered by the `[ingest]`
//! globs; `.git/`, `target/` and `node_modules/` are always skipped. Files
//! are ingested one at a time in sorted order, each all-or-nothing. A file
//! that fails is reported and the run continues.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use docshelf_core::store::Store;

use crate::config::{Config, IngestConfig};
use crate::extract;
use crate::library::{self, short_id, IngestOutcome, IngestRequest, Library};

/// Counts printed at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub ingested: usize,
    pub replaced: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl IngestSummary {
    fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Ingested { .. } => self.ingested += 1,
            IngestOutcome::Replaced { .. } => self.replaced += 1,
            IngestOutcome::Duplicate { .. } => self.duplicates += 1,
        }
    }
}

pub async fn run_ingest(config: &Config, path: &Path, force: bool) -> Result<()> {
    if !path.exists() {
        bail!("Path does not exist: {}", path.display());
    }
    let single_file = path.is_file();
    let files = if single_file {
        vec![path.to_path_buf()]
    } else {
        scan_directory(path, &config.ingest)?
    };

    let library = library::open_library(config).await?;
    println!("ingest {}", path.display());

    let mut summary = IngestSummary {
        files: files.len(),
        ..Default::default()
    };
    let mut last_error = None;

    for file in &files {
        match ingest_file(&library, file, force).await {
            Ok(outcome) => {
                print_outcome(file, &outcome);
                summary.record(&outcome);
            }
            Err(e) => {
                warn!(path = %file.display(), error = %format!("{:#}", e), "ingest failed");
                println!("  failed: {}: {:#}", file.display(), e);
                summary.failed += 1;
                last_error = Some(e);
            }
        }
    }

    println!("  files: {}", summary.files);
    println!("  ingested: {}", summary.ingested);
    println!("  replaced: {}", summary.replaced);
    println!("  duplicates: {}", summary.duplicates);
    println!("  failed: {}", summary.failed);

    library.store().close().await;

    match last_error {
        Some(e) if single_file => Err(e),
        _ => {
            println!("ok");
            Ok(())
        }
    }
}

async fn ingest_file<S: Store + ?Sized>(
    library: &Library<S>,
    file: &Path,
    force: bool,
) -> Result<IngestOutcome> {
    let extracted = extract::load_file(file)?;
    // Canonical paths make re-ingest from another working directory hit the
    // same slot.
    let canonical = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
    let request = IngestRequest::from_extracted(&canonical, extracted, force);
    library
        .ingest(request)
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))
}

fn print_outcome(file: &Path, outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Ingested { id } => {
            println!("  ingested: {} ({})", file.display(), id);
        }
        IngestOutcome::Replaced { id, replaced } => {
            let old: Vec<&str> = replaced.iter().map(|r| short_id(r)).collect();
            println!(
                "  replaced: {} ({}, was {})",
                file.display(),
                id,
                old.join(", ")
            );
        }
        IngestOutcome::Duplicate { existing_id } => {
            println!(
                "  duplicate: {} (already stored as {}; use --force to replace)",
                file.display(),
                existing_id
            );
        }
    }
}

/// Files under `root` matching the include globs, sorted.
pub fn scan_directory(root: &Path, config: &IngestConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
