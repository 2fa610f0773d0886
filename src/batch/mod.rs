// src/batch/mod.rs

//! Basecalling batches and the per-file lock protocol.
//!
//! A file belongs to at most one in-flight batch. Claiming happens through
//! zero-byte lock markers created with create-exclusive semantics, so two
//! invocations racing for the same file cannot both win. The batch job
//! itself writes the done markers and removes its locks on exit; stalled
//! locks are reclaimed by [`crate::recovery`].

pub mod manifest;
pub mod select;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{EldoradoError, Result};
use crate::fs::FileSystem;
use crate::run::descriptor::{
    BATCH_BAM, BATCH_DONE, BATCH_JOB_ID, BATCH_LOG, BATCH_MANIFEST, BATCH_SCRIPT,
};
use crate::run::RunDescriptor;

pub use manifest::{read_manifest, write_manifest};
pub use select::{get_unclaimed_files, group_by_max_size, plan_batches};

/// Length of a batch id in hex characters.
pub const BATCH_ID_LEN: usize = 32;

/// Content-derived batch id: hash of the member paths and creation time.
pub fn batch_id(files: &[PathBuf], created_at: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    for file in files {
        hasher.update(file.to_string_lossy().as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(&created_at.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..BATCH_ID_LEN].to_string()
}

/// One group of pod5 files basecalled by a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: String,
    pub files: Vec<PathBuf>,
    pub working_dir: PathBuf,
    pub lock_files: Vec<PathBuf>,
    pub done_files: Vec<PathBuf>,
}

impl Batch {
    /// Derive the id and layout of a batch. Touches nothing on disk.
    pub fn new(run: &RunDescriptor, files: Vec<PathBuf>, created_at: u64) -> Self {
        let id = batch_id(&files, created_at);
        let working_dir = run.batches_dir().join(&id);
        let lock_files = files.iter().map(|f| run.lock_marker_for(f)).collect();
        let done_files = files.iter().map(|f| run.done_marker_for(f)).collect();
        Self {
            id,
            files,
            working_dir,
            lock_files,
            done_files,
        }
    }

    /// Rebuild a batch from an existing working directory and its manifest.
    pub fn from_working_dir(run: &RunDescriptor, working_dir: &Path, files: Vec<PathBuf>) -> Self {
        let id = working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            lock_files: files.iter().map(|f| run.lock_marker_for(f)).collect(),
            done_files: files.iter().map(|f| run.done_marker_for(f)).collect(),
            files,
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn output_bam(&self) -> PathBuf {
        self.working_dir.join(BATCH_BAM)
    }

    pub fn log_file(&self) -> PathBuf {
        self.working_dir.join(BATCH_LOG)
    }

    pub fn done_file(&self) -> PathBuf {
        self.working_dir.join(BATCH_DONE)
    }

    pub fn job_id_file(&self) -> PathBuf {
        self.working_dir.join(BATCH_JOB_ID)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.working_dir.join(BATCH_MANIFEST)
    }

    pub fn script_file(&self) -> PathBuf {
        self.working_dir.join(BATCH_SCRIPT)
    }

    /// Claim every member and persist the manifest.
    ///
    /// Locks are created first, each exclusively. If any lock already exists
    /// the batch is abandoned with [`EldoradoError::LockConflict`]; locks
    /// created before the conflict stay behind as orphans for recovery.
    pub fn setup(&self, fs: &dyn FileSystem) -> Result<()> {
        for lock in &self.lock_files {
            if !fs.create_new(lock)? {
                return Err(EldoradoError::LockConflict(lock.clone()));
            }
        }
        debug!(batch_id = %self.id, locks = self.lock_files.len(), "claimed files");

        fs.create_dir_all(&self.working_dir)?;
        write_manifest(fs, &self.manifest_file(), &self.files)?;

        info!(
            batch_id = %self.id,
            files = self.files.len(),
            dir = ?self.working_dir,
            "batch set up"
        );
        Ok(())
    }
}
