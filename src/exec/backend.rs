// src/exec/backend.rs

//! Pluggable job scheduler abstraction.
//!
//! The pipeline talks to a `JobScheduler` instead of calling SLURM directly.
//! This makes it easy to swap in a fake scheduler in tests while keeping the
//! production implementation in [`super::slurm`].
//!
//! - `SlurmScheduler` shells out to `sbatch` and `squeue`.
//! - Tests can provide their own `JobScheduler` that records submitted
//!   scripts and answers queue queries from an in-memory set.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::errors::Result;

/// Identifier assigned by the scheduler to a submitted job.
pub type JobId = String;

/// Trait abstracting how batch jobs are submitted and observed.
pub trait JobScheduler: Send + Sync {
    /// Submit the script at `script` and return the scheduler's job id.
    fn submit<'a>(
        &'a self,
        script: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<JobId>> + Send + 'a>>;

    /// True while the job is pending or running.
    ///
    /// An error means the queue could not be asked, which is different from
    /// "not queued": callers must not reclaim anything on error.
    fn is_queued_or_running<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}
