// src/recovery.rs

//! Reclaiming work left behind by jobs that died without cleaning up.
//!
//! A lock marker is only legitimate while some batch listing that file in its
//! manifest has a job the scheduler still knows about. Everything else is an
//! orphan: the job was killed before its exit trap ran, submission failed, or
//! a lock conflict abandoned a half-claimed batch. Orphaned locks are removed
//! so the files are picked up again, and stalled batch directories are
//! deleted.
//!
//! All manifests are read before any directory is removed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::batch::{read_manifest, Batch};
use crate::errors::Result;
use crate::exec::JobScheduler;
use crate::fs::{list_dir_or_empty, FileSystem};
use crate::run::RunDescriptor;

/// What [`reconcile`] found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Batch directories with a live job.
    pub live_batches: Vec<PathBuf>,
    pub freed_locks: Vec<PathBuf>,
    pub removed_batches: Vec<PathBuf>,
    /// `merge.lock` / `demux.lock` markers that were freed.
    pub freed_stage_locks: Vec<PathBuf>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.freed_locks.is_empty()
            && self.removed_batches.is_empty()
            && self.freed_stage_locks.is_empty()
    }
}

/// Read a job id file, `None` if it is missing or empty.
pub fn read_job_id(fs: &dyn FileSystem, path: &Path) -> Option<String> {
    if !fs.is_file(path) {
        return None;
    }
    fs.read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn job_is_live(
    fs: &dyn FileSystem,
    scheduler: &dyn JobScheduler,
    job_id_file: &Path,
) -> Result<bool> {
    match read_job_id(fs, job_id_file) {
        Some(job_id) => scheduler.is_queued_or_running(&job_id).await,
        None => Ok(false),
    }
}

fn remove_best_effort(fs: &dyn FileSystem, path: &Path, dir: bool) -> bool {
    let result = if dir {
        fs.remove_dir_all(path)
    } else {
        fs.remove_file(path)
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(path = ?path, error = %err, "could not remove");
            false
        }
    }
}

/// Reconcile lock markers and batch directories against the scheduler.
///
/// A failing queue query aborts the whole reconcile before anything is
/// removed; an unreachable scheduler must never look like "no jobs".
/// With `dry_run` nothing is removed but the report lists what would be.
pub async fn reconcile(
    fs: &dyn FileSystem,
    scheduler: &dyn JobScheduler,
    run: &RunDescriptor,
    dry_run: bool,
) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    // Which locks are backed by a live batch.
    let mut legit_locks: HashSet<PathBuf> = HashSet::new();
    let mut stalled = Vec::new();

    for dir in list_dir_or_empty(fs, run.batches_dir())? {
        if !fs.is_dir(&dir) {
            continue;
        }
        let probe = Batch::from_working_dir(run, &dir, Vec::new());
        if fs.exists(&probe.done_file()) {
            continue;
        }

        let live = fs.is_file(&probe.manifest_file())
            && job_is_live(fs, scheduler, &probe.job_id_file()).await?;

        if live {
            let files = read_manifest(fs, &probe.manifest_file())?;
            let batch = Batch::from_working_dir(run, &dir, files);
            legit_locks.extend(batch.lock_files);
            report.live_batches.push(dir);
        } else {
            stalled.push(dir);
        }
    }

    // Stage locks whose job is gone and whose stage never finished.
    let mut stale_stage_locks = Vec::new();
    let stages = [
        (run.merge_lock(), run.merge_job_id_file(), run.merge_done()),
        (run.demux_lock(), run.demux_job_id_file(), run.demux_done()),
    ];
    for (lock, job_id_file, done) in stages {
        if fs.exists(&lock)
            && !fs.exists(&done)
            && !job_is_live(fs, scheduler, &job_id_file).await?
        {
            stale_stage_locks.push(lock);
        }
    }

    // Every query succeeded; now remove.
    for lock in list_dir_or_empty(fs, run.lock_dir())? {
        if legit_locks.contains(&lock) {
            continue;
        }
        debug!(lock = ?lock, "orphaned lock");
        if dry_run || remove_best_effort(fs, &lock, false) {
            report.freed_locks.push(lock);
        }
    }

    for dir in stalled {
        debug!(dir = ?dir, "stalled batch");
        if dry_run || remove_best_effort(fs, &dir, true) {
            report.removed_batches.push(dir);
        }
    }

    for lock in stale_stage_locks {
        debug!(lock = ?lock, "stale stage lock");
        if dry_run || remove_best_effort(fs, &lock, false) {
            report.freed_stage_locks.push(lock);
        }
    }

    if !report.is_empty() {
        info!(
            run = ?run.input_dir(),
            dry_run,
            freed_locks = report.freed_locks.len(),
            removed_batches = report.removed_batches.len(),
            freed_stage_locks = report.freed_stage_locks.len(),
            "recovered stalled work"
        );
    }

    Ok(report)
}
