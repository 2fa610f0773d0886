// src/run/transfer.rs

//! Deciding which raw pod5 files are completely written, and whether the
//! instrument has finished acquiring a run.
//!
//! Everything here answers "is it ready yet?", so failures to read a file
//! are treated as "not ready" and logged at debug level instead of being
//! propagated.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use regex::Regex;
use tracing::debug;

use crate::fs::{file_name_str, list_dir_or_empty, FileSystem};
use crate::run::RunDescriptor;
use crate::types::TransferCheck;

/// Magic bytes found at both the start and the end of a complete pod5 file.
pub const POD5_SIGNATURE: [u8; 8] = [0x8B, b'P', b'O', b'D', b'\r', b'\n', 0x1A, b'\n'];

/// Default quiescence period for the age-based check.
pub const DEFAULT_MIN_AGE: Duration = Duration::from_secs(30 * 60);

pub const POD5_EXTENSION: &str = "pod5";

static EXPECTED_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pod5_files_in_final_dest=(\d+)").expect("expected-count regex is valid")
});

/// How transferred files are recognised during one pass.
///
/// `now` is captured once per pass so that every predicate in the pass
/// agrees on the clock.
#[derive(Debug, Clone, Copy)]
pub struct TransferPolicy {
    pub check: TransferCheck,
    pub min_age: Duration,
    pub now: SystemTime,
}

impl TransferPolicy {
    pub fn new(check: TransferCheck, min_age: Duration) -> Self {
        Self {
            check,
            min_age,
            now: SystemTime::now(),
        }
    }

    pub fn at(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self::new(TransferCheck::default(), DEFAULT_MIN_AGE)
    }
}

/// True if `path` starts and ends with [`POD5_SIGNATURE`].
pub fn has_pod5_signature(fs: &dyn FileSystem, path: &Path) -> bool {
    let check = || -> Result<bool> {
        let head = fs.read_head(path, POD5_SIGNATURE.len())?;
        if head != POD5_SIGNATURE {
            return Ok(false);
        }
        let tail = fs.read_tail(path, POD5_SIGNATURE.len())?;
        Ok(tail == POD5_SIGNATURE)
    };
    check().unwrap_or_else(|err| {
        debug!(file = ?path, error = %err, "signature check failed");
        false
    })
}

/// True if `path` has not been modified for strictly longer than `min_age`.
pub fn is_file_inactive(
    fs: &dyn FileSystem,
    path: &Path,
    min_age: Duration,
    now: SystemTime,
) -> bool {
    match fs.modified(path) {
        Ok(modified) => now
            .duration_since(modified)
            .map(|age| age > min_age)
            .unwrap_or(false),
        Err(err) => {
            debug!(file = ?path, error = %err, "could not read modification time");
            false
        }
    }
}

pub fn is_file_transferred(fs: &dyn FileSystem, path: &Path, policy: &TransferPolicy) -> bool {
    match policy.check {
        TransferCheck::Signature => has_pod5_signature(fs, path),
        TransferCheck::Age => is_file_inactive(fs, path, policy.min_age, policy.now),
    }
}

pub fn is_pod5_file(fs: &dyn FileSystem, path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(POD5_EXTENSION) && fs.is_file(path)
}

/// All `*.pod5` files directly inside `dir`, sorted by path.
pub fn list_pod5_files(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_dir_or_empty(fs, dir)?
        .into_iter()
        .filter(|p| is_pod5_file(fs, p))
        .collect())
}

/// Transferred pod5 files of a run in acquisition order
/// (modification time, then file name).
pub fn get_transferred_files(
    fs: &dyn FileSystem,
    run: &RunDescriptor,
    policy: &TransferPolicy,
) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(SystemTime, PathBuf)> = list_pod5_files(fs, run.input_dir())?
        .into_iter()
        .filter(|p| is_file_transferred(fs, p, policy))
        .map(|p| (fs.modified(&p).unwrap_or(UNIX_EPOCH), p))
        .collect();

    files.sort_by(|(ta, pa), (tb, pb)| {
        ta.cmp(tb)
            .then_with(|| pa.file_name().cmp(&pb.file_name()))
    });

    Ok(files.into_iter().map(|(_, p)| p).collect())
}

/// First `final_summary*.txt` next to the input directory, if any.
pub fn find_final_summary(fs: &dyn FileSystem, run: &RunDescriptor) -> Option<PathBuf> {
    find_sidecar(fs, run, "final_summary", ".txt")
}

/// First `sample_sheet*.csv` next to the input directory, if any.
pub fn find_sample_sheet(fs: &dyn FileSystem, run: &RunDescriptor) -> Option<PathBuf> {
    find_sidecar(fs, run, "sample_sheet", ".csv")
}

fn find_sidecar(
    fs: &dyn FileSystem,
    run: &RunDescriptor,
    prefix: &str,
    suffix: &str,
) -> Option<PathBuf> {
    list_dir_or_empty(fs, run.parent_dir())
        .ok()?
        .into_iter()
        .filter(|p| fs.is_file(p))
        .find(|p| {
            file_name_str(p)
                .map(|name| name.starts_with(prefix) && name.ends_with(suffix))
                .unwrap_or(false)
        })
}

/// Parse the expected pod5 file count out of a final summary text.
pub fn parse_expected_file_count(summary: &str) -> Option<usize> {
    EXPECTED_COUNT_RE
        .captures(summary)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// True once the instrument has written its final summary and the number of
/// transferred files equals the count it reports.
///
/// Only the count is compared, not the identity of the files.
pub fn are_all_files_transferred(
    fs: &dyn FileSystem,
    run: &RunDescriptor,
    policy: &TransferPolicy,
) -> bool {
    let Some(summary) = find_final_summary(fs, run) else {
        return false;
    };

    let expected = match fs.read_to_string(&summary) {
        Ok(text) => parse_expected_file_count(&text),
        Err(err) => {
            debug!(file = ?summary, error = %err, "could not read final summary");
            None
        }
    };
    let Some(expected) = expected else {
        return false;
    };

    match get_transferred_files(fs, run, policy) {
        Ok(files) => files.len() == expected,
        Err(err) => {
            debug!(run = ?run.input_dir(), error = %err, "could not list transferred files");
            false
        }
    }
}
