// src/stages/cleanup.rs

//! Final stage: summarize batch logs and delete intermediate files.

use std::collections::HashMap;
use std::path::Path;

use anyhow::anyhow;
use csv::Writer;
use tracing::{debug, info};

use crate::batch::Batch;
use crate::errors::Result;
use crate::fs::{list_dir_or_empty, FileSystem};
use crate::run::RunDescriptor;
use crate::stages::StageContext;

/// One batch log: `key=value` pairs in file order.
pub type BatchLog = Vec<(String, String)>;

pub fn parse_batch_log(text: &str) -> BatchLog {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// Logs of every batch that wrote one, sorted by batch directory.
pub fn load_batch_logs(fs: &dyn FileSystem, run: &RunDescriptor) -> Result<Vec<BatchLog>> {
    let mut logs = Vec::new();
    for dir in list_dir_or_empty(fs, run.batches_dir())? {
        let log_file = Batch::from_working_dir(run, &dir, Vec::new()).log_file();
        if fs.is_file(&log_file) {
            logs.push(parse_batch_log(&fs.read_to_string(&log_file)?));
        }
    }
    Ok(logs)
}

/// CSV with the union of keys (first-seen order) as header and one row per
/// log; keys a log lacks are left blank.
pub fn render_summary_csv(logs: &[BatchLog]) -> Result<String> {
    let mut columns: Vec<&str> = Vec::new();
    for log in logs {
        for (key, _) in log {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    if columns.is_empty() {
        return Ok("\n".to_string());
    }

    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for log in logs {
        let values: HashMap<&str, &str> = log.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        writer.write_record(columns.iter().map(|c| values.get(c).copied().unwrap_or("")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("flushing summary csv: {}", e.error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn write_summary_csv(fs: &dyn FileSystem, path: &Path, logs: &[BatchLog]) -> Result<()> {
    fs.write(path, render_summary_csv(logs)?.as_bytes())?;
    Ok(())
}

/// Write the summary, delete batch directories and the merged bam, and
/// mark the run as cleaned up. Lock and done marker directories are kept.
pub fn process_cleanup(ctx: &StageContext<'_>, run: &RunDescriptor) -> Result<()> {
    let logs = load_batch_logs(ctx.fs, run)?;

    if ctx.dry_run() {
        info!(run = ?run.input_dir(), batches = logs.len(), "dry run: would clean up");
        return Ok(());
    }

    write_summary_csv(ctx.fs, &run.summary_csv(), &logs)?;

    if ctx.fs.is_dir(run.batches_dir()) {
        ctx.fs.remove_dir_all(run.batches_dir())?;
        debug!(dir = ?run.batches_dir(), "removed batch directories");
    }
    if ctx.fs.exists(&run.merged_bam()) {
        ctx.fs.remove_file(&run.merged_bam())?;
    }

    ctx.fs.create_new(&run.cleanup_done())?;
    info!(run = ?run.input_dir(), summary = ?run.summary_csv(), "run cleaned up");
    Ok(())
}
