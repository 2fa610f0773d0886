// src/stages/mod.rs

//! Stage drivers: turn a pending stage into markers, scripts and jobs.
//!
//! - [`basecalling`] batches unclaimed files and submits one job per batch.
//! - [`merging`] merges the batch bams.
//! - [`demultiplexing`] splits the merged bam by barcode, or promotes it to
//!   the final output.
//! - [`cleanup`] writes the summary and removes intermediates.
//! - [`scripts`] renders the job scripts.

pub mod basecalling;
pub mod cleanup;
pub mod demultiplexing;
pub mod merging;
pub mod scripts;

use crate::config::Settings;
use crate::exec::JobScheduler;
use crate::fs::FileSystem;
use crate::run::TransferPolicy;

/// Everything a stage driver needs for one pass.
pub struct StageContext<'a> {
    pub fs: &'a dyn FileSystem,
    pub scheduler: &'a dyn JobScheduler,
    pub settings: &'a Settings,
    pub policy: TransferPolicy,
    /// Seconds since the epoch at the start of the pass; seeds batch ids.
    pub created_at: u64,
}

impl StageContext<'_> {
    pub fn dry_run(&self) -> bool {
        self.settings.dry_run
    }
}
