// src/batch/select.rs

//! Choosing which files go into new batches.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::batch::Batch;
use crate::config::BatchLimits;
use crate::errors::Result;
use crate::fs::{file_name_str, list_dir_or_empty, FileSystem};
use crate::run::descriptor::{DONE_SUFFIX, LOCK_SUFFIX};
use crate::run::transfer::{are_all_files_transferred, get_transferred_files, TransferPolicy};
use crate::run::RunDescriptor;

/// Names of the input files that have a marker with `suffix` in `dir`.
fn marked_file_names(fs: &dyn FileSystem, dir: &Path, suffix: &str) -> Result<HashSet<String>> {
    Ok(list_dir_or_empty(fs, dir)?
        .iter()
        .filter_map(|p| file_name_str(p))
        .filter_map(|name| name.strip_suffix(suffix))
        .map(str::to_string)
        .collect())
}

/// Transferred files that are neither locked nor done, in acquisition order.
///
/// Locks and done markers are listed before the transferred files, so a file
/// finishing between the two listings is at worst seen as still locked.
pub fn get_unclaimed_files(
    fs: &dyn FileSystem,
    run: &RunDescriptor,
    policy: &TransferPolicy,
) -> Result<Vec<PathBuf>> {
    let locked = marked_file_names(fs, run.lock_dir(), LOCK_SUFFIX)?;
    let done = marked_file_names(fs, run.done_dir(), DONE_SUFFIX)?;

    let unclaimed = get_transferred_files(fs, run, policy)?
        .into_iter()
        .filter(|f| {
            file_name_str(f)
                .map(|name| !locked.contains(name) && !done.contains(name))
                .unwrap_or(false)
        })
        .collect();

    Ok(unclaimed)
}

/// Greedy bin-fill over `items` in order.
///
/// A group is closed when adding the next item would push it over
/// `max_size`; an item larger than `max_size` forms a group of its own.
pub fn group_by_max_size<T: Clone>(items: &[(T, u64)], max_size: u64) -> Vec<Vec<T>> {
    let mut groups = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_size: u64 = 0;

    for (item, size) in items {
        if !current.is_empty() && current_size.saturating_add(*size) > max_size {
            groups.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(item.clone());
        current_size = current_size.saturating_add(*size);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Batches to submit for a run in this pass.
///
/// Nothing is returned while the unclaimed files add up to less than
/// `limits.min_size`, unless the instrument has finished and this is the
/// remainder of the run.
pub fn plan_batches(
    fs: &dyn FileSystem,
    run: &RunDescriptor,
    policy: &TransferPolicy,
    limits: BatchLimits,
    created_at: u64,
) -> Result<Vec<Batch>> {
    let unclaimed = get_unclaimed_files(fs, run, policy)?;
    if unclaimed.is_empty() {
        return Ok(Vec::new());
    }

    let mut sized = Vec::with_capacity(unclaimed.len());
    for file in unclaimed {
        let size = fs.size(&file)?;
        sized.push((file, size));
    }
    let total: u64 = sized.iter().map(|(_, s)| *s).sum();

    if total < limits.min_size {
        if !are_all_files_transferred(fs, run, policy) {
            info!(
                run = ?run.input_dir(),
                total,
                min_size = limits.min_size,
                "waiting for more data before creating a batch"
            );
            return Ok(Vec::new());
        }
        debug!(run = ?run.input_dir(), total, "flushing final undersized batch");
    }

    Ok(group_by_max_size(&sized, limits.max_size)
        .into_iter()
        .map(|files| Batch::new(run, files, created_at))
        .collect())
}
