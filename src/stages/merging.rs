// src/stages/merging.rs

use std::path::PathBuf;

use tracing::info;

use crate::errors::{EldoradoError, Result};
use crate::fs::list_dir_or_empty;
use crate::run::descriptor::BATCH_BAM;
use crate::run::RunDescriptor;
use crate::stages::scripts::merging_script;
use crate::stages::StageContext;

/// Output bams of all finished batches, sorted by batch directory.
pub fn batch_bams(ctx: &StageContext<'_>, run: &RunDescriptor) -> Result<Vec<PathBuf>> {
    Ok(list_dir_or_empty(ctx.fs, run.batches_dir())?
        .into_iter()
        .map(|dir| dir.join(BATCH_BAM))
        .filter(|bam| ctx.fs.is_file(bam))
        .collect())
}

/// Submit the merge of all batch outputs.
///
/// `merge.lock` is claimed exclusively before submission.
pub async fn process_merging(
    ctx: &StageContext<'_>,
    run: &RunDescriptor,
    account: Option<&str>,
) -> Result<()> {
    let bams = batch_bams(ctx, run)?;
    if bams.is_empty() {
        return Err(EldoradoError::NothingToMerge(run.batches_dir().to_path_buf()));
    }

    let script = merging_script(
        run,
        &bams,
        &ctx.settings.scheduler,
        account,
        &ctx.settings.mail_users,
    );

    if ctx.dry_run() {
        info!(run = ?run.input_dir(), bams = bams.len(), "dry run: would submit merging");
        return Ok(());
    }

    if !ctx.fs.create_new(&run.merge_lock())? {
        return Err(EldoradoError::LockConflict(run.merge_lock()));
    }
    ctx.fs.write(&run.merge_script(), script.as_bytes())?;

    let job_id = ctx.scheduler.submit(&run.merge_script()).await?;
    ctx.fs.write(&run.merge_job_id_file(), job_id.as_bytes())?;

    info!(run = ?run.input_dir(), job_id = %job_id, bams = bams.len(), "merging submitted");
    Ok(())
}
