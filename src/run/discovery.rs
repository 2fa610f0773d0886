// src/run/discovery.rs

//! Finding run directories under a root.
//!
//! The pattern is a glob relative to the root (e.g. `*/*/*/pod5*`). `*` does
//! not cross directory separators; `**` does.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, trace};

use crate::fs::{file_name_str, list_dir_or_empty, FileSystem};
use crate::run::descriptor::OUTPUT_DIR_SUFFIX;
use crate::run::transfer::list_pod5_files;
use crate::run::RunDescriptor;

/// Compile a root-relative glob pattern.
pub fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid run pattern '{pattern}'"))?;
    Ok(glob.compile_matcher())
}

/// All directories under `root` whose relative path matches `pattern`,
/// sorted. Matched directories are not descended into.
pub fn find_matching_dirs(fs: &dyn FileSystem, root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = compile_pattern(pattern)?;

    let mut matches = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in list_dir_or_empty(fs, &dir)? {
            if !fs.is_dir(&entry) {
                continue;
            }
            let Ok(rel) = entry.strip_prefix(root) else {
                continue;
            };
            if matcher.is_match(rel) {
                trace!(dir = ?entry, "pattern matched");
                matches.push(entry);
            } else {
                stack.push(entry);
            }
        }
    }

    matches.sort();
    Ok(matches)
}

/// Runs under `root` that still need work.
///
/// A matched directory is a run if it contains pod5 files, nothing else has
/// already produced bam/fastq output for it, and it was not cleaned up.
pub fn find_runs(fs: &dyn FileSystem, root: &Path, pattern: &str) -> Result<Vec<RunDescriptor>> {
    let mut runs = Vec::new();

    for dir in find_matching_dirs(fs, root, pattern)? {
        let run = RunDescriptor::new(&dir);

        if list_pod5_files(fs, run.input_dir())?.is_empty() {
            debug!(dir = ?dir, "skipping: no pod5 files");
            continue;
        }
        if fs.exists(&run.cleanup_done()) {
            debug!(dir = ?dir, "skipping: already cleaned up");
            continue;
        }
        if has_external_output(fs, &run)? {
            debug!(dir = ?dir, "skipping: output produced elsewhere");
            continue;
        }

        runs.push(run);
    }

    Ok(runs)
}

/// True if the run's parent holds `bam*/*.bam` or `fastq*/*.fastq*` output
/// that eldorado did not write.
///
/// Every `*_eldorado` directory is ours, including the output of sibling
/// runs such as `pod5_fail` next to `pod5_pass`.
pub fn has_external_output(fs: &dyn FileSystem, run: &RunDescriptor) -> Result<bool> {
    for entry in list_dir_or_empty(fs, run.parent_dir())? {
        if entry == run.output_dir() || !fs.is_dir(&entry) {
            continue;
        }
        let Some(dir_name) = file_name_str(&entry) else {
            continue;
        };
        if dir_name.ends_with(OUTPUT_DIR_SUFFIX) {
            continue;
        }

        let is_output = |name: &str| {
            (dir_name.starts_with("bam") && name.ends_with(".bam"))
                || (dir_name.starts_with("fastq") && name.contains(".fastq"))
        };

        if !dir_name.starts_with("bam") && !dir_name.starts_with("fastq") {
            continue;
        }

        let found = list_dir_or_empty(fs, &entry)?
            .iter()
            .filter(|p| fs.is_file(p))
            .filter_map(|p| file_name_str(p))
            .any(is_output);
        if found {
            return Ok(true);
        }
    }
    Ok(false)
}
