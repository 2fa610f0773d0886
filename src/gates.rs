// src/gates.rs

//! Stage gates: which stage of a run may run now.
//!
//! Gates only read the filesystem and never fail; anything missing or
//! unreadable means "not ready".

use tracing::debug;

use crate::batch::get_unclaimed_files;
use crate::fs::{file_name_str, list_dir_or_empty, FileSystem};
use crate::run::transfer::{are_all_files_transferred, get_transferred_files, TransferPolicy};
use crate::run::RunDescriptor;
use crate::types::Stage;

pub fn basecalling_is_pending(fs: &dyn FileSystem, run: &RunDescriptor, policy: &TransferPolicy) -> bool {
    if !fs.exists(&run.config_file()) {
        return false;
    }
    match get_unclaimed_files(fs, run, policy) {
        Ok(files) => !files.is_empty(),
        Err(err) => {
            debug!(run = ?run.input_dir(), error = %err, "could not list unclaimed files");
            false
        }
    }
}

/// True if every transferred file has a done marker.
pub fn all_transferred_files_done(fs: &dyn FileSystem, run: &RunDescriptor, policy: &TransferPolicy) -> bool {
    match get_transferred_files(fs, run, policy) {
        Ok(files) => files.iter().all(|f| fs.exists(&run.done_marker_for(f))),
        Err(err) => {
            debug!(run = ?run.input_dir(), error = %err, "could not list transferred files");
            false
        }
    }
}

pub fn merging_is_pending(fs: &dyn FileSystem, run: &RunDescriptor, policy: &TransferPolicy) -> bool {
    !basecalling_is_pending(fs, run, policy)
        && !fs.exists(&run.merge_lock())
        && !fs.exists(&run.merge_done())
        && all_transferred_files_done(fs, run, policy)
        && are_all_files_transferred(fs, run, policy)
}

pub fn demultiplexing_is_pending(fs: &dyn FileSystem, run: &RunDescriptor) -> bool {
    fs.exists(&run.merge_done())
        && (fs.exists(&run.merged_bam()) || demux_skip_interrupted(fs, run))
        && !fs.exists(&run.demux_lock())
        && !fs.exists(&run.demux_done())
        && fs.exists(&run.config_file())
}

/// The merged bam was moved to the output dir as the final output but
/// `demux.done` was never created.
pub fn demux_skip_interrupted(fs: &dyn FileSystem, run: &RunDescriptor) -> bool {
    if !fs.exists(&run.merge_done()) || fs.exists(&run.merged_bam()) || fs.exists(&run.demux_done()) {
        return false;
    }
    list_dir_or_empty(fs, run.output_dir())
        .unwrap_or_default()
        .iter()
        .any(|p| fs.is_file(p) && file_name_str(p).is_some_and(|n| n.ends_with(".bam")))
}

pub fn needs_cleanup(fs: &dyn FileSystem, run: &RunDescriptor) -> bool {
    fs.exists(&run.demux_done()) && !fs.exists(&run.cleanup_done())
}

pub fn is_pending(fs: &dyn FileSystem, run: &RunDescriptor, policy: &TransferPolicy, stage: Stage) -> bool {
    match stage {
        Stage::Basecalling => basecalling_is_pending(fs, run, policy),
        Stage::Merging => merging_is_pending(fs, run, policy),
        Stage::Demultiplexing => demultiplexing_is_pending(fs, run),
        Stage::Cleanup => needs_cleanup(fs, run),
    }
}

/// The single stage to act on this pass: the first pending one in
/// lifecycle order.
pub fn next_stage(fs: &dyn FileSystem, run: &RunDescriptor, policy: &TransferPolicy) -> Option<Stage> {
    Stage::ALL
        .into_iter()
        .find(|stage| is_pending(fs, run, policy, *stage))
}
