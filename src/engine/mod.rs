// src/engine/mod.rs

//! One scheduling pass over all discovered runs.
//!
//! Each invocation of eldorado is one pass: for every run, reclaim stalled
//! work, make sure the run has a dorado config, then act on the first pending
//! stage. Nothing is carried between passes except the marker files.
//!
//! The driver lives in [`pipeline`]; this module holds the outcome types it
//! reports.

use std::fmt;
use std::path::PathBuf;

use crate::stages::demultiplexing::DemuxAction;

pub mod pipeline;

pub use pipeline::Pipeline;

/// What happened to one run during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No stage was pending.
    Idle,
    /// Dry run on a run without a config; nothing further is evaluated.
    ConfigPending,
    Basecalling { batches: usize },
    Merging,
    Demultiplexing(DemuxAction),
    Cleanup,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Idle => f.write_str("idle"),
            RunOutcome::ConfigPending => f.write_str("config pending"),
            RunOutcome::Basecalling { batches } => write!(f, "basecalling ({batches} batches)"),
            RunOutcome::Merging => f.write_str("merging submitted"),
            RunOutcome::Demultiplexing(DemuxAction::Submitted) => {
                f.write_str("demultiplexing submitted")
            }
            RunOutcome::Demultiplexing(DemuxAction::Skipped { .. }) => {
                f.write_str("demultiplexing skipped")
            }
            RunOutcome::Cleanup => f.write_str("cleaned up"),
        }
    }
}

/// Per-run results of a pass. Failures never stop the other runs.
#[derive(Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<(PathBuf, RunOutcome)>,
    pub failures: Vec<(PathBuf, String)>,
}

impl PassReport {
    pub fn outcome_for(&self, input_dir: &std::path::Path) -> Option<&RunOutcome> {
        self.outcomes
            .iter()
            .find(|(dir, _)| dir == input_dir)
            .map(|(_, outcome)| outcome)
    }
}
