// src/exec/slurm.rs

//! SLURM implementation of [`JobScheduler`].

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::model::SchedulerSection;
use crate::errors::{EldoradoError, Result};

use super::backend::{JobId, JobScheduler};

/// Parse `sbatch --parsable` output: `<job id>[;<cluster>]`.
pub fn parse_sbatch_output(stdout: &str) -> Option<JobId> {
    let id = stdout.trim().split(';').next()?.trim();
    (!id.is_empty()).then(|| id.to_string())
}

#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    sbatch: String,
    squeue: String,
}

impl SlurmScheduler {
    pub fn new(sbatch: impl Into<String>, squeue: impl Into<String>) -> Self {
        Self {
            sbatch: sbatch.into(),
            squeue: squeue.into(),
        }
    }

    pub fn from_config(section: &SchedulerSection) -> Self {
        Self::new(&section.sbatch, &section.squeue)
    }
}

impl Default for SlurmScheduler {
    fn default() -> Self {
        Self::new("sbatch", "squeue")
    }
}

impl JobScheduler for SlurmScheduler {
    fn submit<'a>(
        &'a self,
        script: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<JobId>> + Send + 'a>> {
        Box::pin(async move {
            let output = Command::new(&self.sbatch)
                .arg("--parsable")
                .arg(script)
                .stdin(Stdio::null())
                .output()
                .await
                .with_context(|| format!("spawning '{}' for {:?}", self.sbatch, script))?;

            if !output.status.success() {
                return Err(EldoradoError::SchedulerError(format!(
                    "{} {:?} failed with {}: {}",
                    self.sbatch,
                    script,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let job_id = parse_sbatch_output(&stdout).ok_or_else(|| {
                EldoradoError::SchedulerError(format!(
                    "{} returned no job id for {:?}",
                    self.sbatch, script
                ))
            })?;

            info!(job_id = %job_id, script = ?script, "submitted job");
            Ok(job_id)
        })
    }

    fn is_queued_or_running<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let output = Command::new(&self.squeue)
                .args(["--noheader", "--format=%i", "--job", job_id])
                .stdin(Stdio::null())
                .output()
                .await
                .with_context(|| format!("spawning '{}'", self.squeue))?;

            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let queued = stdout.lines().any(|line| !line.trim().is_empty());
                debug!(job_id, queued, "queried job state");
                return Ok(queued);
            }

            // squeue fails for job ids it has already forgotten.
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Invalid job id") {
                debug!(job_id, "job no longer known to the scheduler");
                return Ok(false);
            }

            Err(EldoradoError::SchedulerError(format!(
                "{} --job {} failed with {}: {}",
                self.squeue,
                job_id,
                output.status,
                stderr.trim()
            )))
        })
    }
}
