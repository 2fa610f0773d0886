// src/run/descriptor.rs

//! Well-known working paths of a sequencing run.
//!
//! Every path is derived from the pod5 input directory alone, so two
//! invocations that look at the same run always agree on where markers live
//! without talking to each other.

use std::path::{Path, PathBuf};

/// Suffix appended to the output directory name.
pub const OUTPUT_DIR_SUFFIX: &str = "_eldorado";

pub const RUN_CONFIG: &str = "dorado_config.json";
pub const BASECALLING_SUMMARY: &str = "basecalling_summary.csv";
pub const CLEANUP_DONE: &str = "cleanup.done";

pub const BASECALLING_DIR: &str = "basecalling";
pub const BATCHES_DIR: &str = "batches";
pub const LOCK_DIR: &str = "lock_files";
pub const DONE_DIR: &str = "done_files";
pub const LOCK_SUFFIX: &str = ".lock";
pub const DONE_SUFFIX: &str = ".done";

pub const BATCH_BAM: &str = "basecalled.bam";
pub const BATCH_LOG: &str = "basecalled.txt";
pub const BATCH_DONE: &str = "batch.done";
pub const BATCH_JOB_ID: &str = "batch_job_id.txt";
pub const BATCH_MANIFEST: &str = "pod5_manifest.txt";
pub const BATCH_SCRIPT: &str = "run_basecaller.sh";

pub const MERGE_DIR: &str = "merging";
pub const MERGE_BAM: &str = "merged.bam";
pub const MERGE_SCRIPT: &str = "run_merging.sh";
pub const MERGE_JOB_ID: &str = "merge_job_id.txt";
pub const MERGE_LOCK: &str = "merge.lock";
pub const MERGE_DONE: &str = "merge.done";

pub const DEMUX_DIR: &str = "demultiplexing";
pub const DEMUX_SCRIPT: &str = "run_demultiplexing.sh";
pub const DEMUX_JOB_ID: &str = "demux_job_id.txt";
pub const DEMUX_LOCK: &str = "demux.lock";
pub const DEMUX_DONE: &str = "demux.done";

/// Immutable description of one run and all its derived paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDescriptor {
    input_dir: PathBuf,
    parent_dir: PathBuf,
    output_dir: PathBuf,

    basecalling_dir: PathBuf,
    batches_dir: PathBuf,
    lock_dir: PathBuf,
    done_dir: PathBuf,

    merge_dir: PathBuf,
    demux_dir: PathBuf,
}

impl RunDescriptor {
    /// Derive all paths for the run whose raw files live in `input_dir`.
    ///
    /// `<parent>/pod5` maps to `<parent>/bam_eldorado`,
    /// `<parent>/pod5_pass` to `<parent>/bam_pass_eldorado`.
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        let parent_dir = input_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let input_name = input_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_name = format!("{}{}", input_name.replace("pod5", "bam"), OUTPUT_DIR_SUFFIX);
        let output_dir = parent_dir.join(output_name);

        let basecalling_dir = output_dir.join(BASECALLING_DIR);
        let batches_dir = basecalling_dir.join(BATCHES_DIR);
        let lock_dir = basecalling_dir.join(LOCK_DIR);
        let done_dir = basecalling_dir.join(DONE_DIR);
        let merge_dir = output_dir.join(MERGE_DIR);
        let demux_dir = output_dir.join(DEMUX_DIR);

        Self {
            input_dir,
            parent_dir,
            output_dir,
            basecalling_dir,
            batches_dir,
            lock_dir,
            done_dir,
            merge_dir,
            demux_dir,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Directory holding the input dir and the instrument's sidecar files.
    pub fn parent_dir(&self) -> &Path {
        &self.parent_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.output_dir.join(RUN_CONFIG)
    }

    pub fn summary_csv(&self) -> PathBuf {
        self.output_dir.join(BASECALLING_SUMMARY)
    }

    pub fn cleanup_done(&self) -> PathBuf {
        self.output_dir.join(CLEANUP_DONE)
    }

    // Basecalling

    pub fn basecalling_dir(&self) -> &Path {
        &self.basecalling_dir
    }

    pub fn batches_dir(&self) -> &Path {
        &self.batches_dir
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    pub fn done_dir(&self) -> &Path {
        &self.done_dir
    }

    /// `<lock_dir>/<file name>.lock` for a raw input file.
    pub fn lock_marker_for(&self, input_file: &Path) -> PathBuf {
        self.lock_dir.join(marker_name(input_file, LOCK_SUFFIX))
    }

    /// `<done_dir>/<file name>.done` for a raw input file.
    pub fn done_marker_for(&self, input_file: &Path) -> PathBuf {
        self.done_dir.join(marker_name(input_file, DONE_SUFFIX))
    }

    // Merging

    pub fn merge_dir(&self) -> &Path {
        &self.merge_dir
    }

    pub fn merged_bam(&self) -> PathBuf {
        self.merge_dir.join(MERGE_BAM)
    }

    pub fn merge_script(&self) -> PathBuf {
        self.merge_dir.join(MERGE_SCRIPT)
    }

    pub fn merge_job_id_file(&self) -> PathBuf {
        self.merge_dir.join(MERGE_JOB_ID)
    }

    pub fn merge_lock(&self) -> PathBuf {
        self.merge_dir.join(MERGE_LOCK)
    }

    pub fn merge_done(&self) -> PathBuf {
        self.merge_dir.join(MERGE_DONE)
    }

    // Demultiplexing

    pub fn demux_dir(&self) -> &Path {
        &self.demux_dir
    }

    pub fn demux_script(&self) -> PathBuf {
        self.demux_dir.join(DEMUX_SCRIPT)
    }

    pub fn demux_job_id_file(&self) -> PathBuf {
        self.demux_dir.join(DEMUX_JOB_ID)
    }

    pub fn demux_lock(&self) -> PathBuf {
        self.demux_dir.join(DEMUX_LOCK)
    }

    pub fn demux_done(&self) -> PathBuf {
        self.demux_dir.join(DEMUX_DONE)
    }
}

fn marker_name(input_file: &Path, suffix: &str) -> String {
    let name = input_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{name}{suffix}")
}
