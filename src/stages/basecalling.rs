// src/stages/basecalling.rs

use tracing::{error, info};

use crate::batch::{plan_batches, Batch};
use crate::config::RunConfig;
use crate::errors::Result;
use crate::run::RunDescriptor;
use crate::stages::scripts::basecalling_script;
use crate::stages::StageContext;

/// Build, claim and submit new batches for a run.
///
/// Returns the number of batches submitted (or that would be, in dry-run).
/// A lock conflict stops this run's basecalling for the pass; batches already
/// submitted stay submitted.
pub async fn process_basecalling(
    ctx: &StageContext<'_>,
    run: &RunDescriptor,
    account: Option<&str>,
) -> Result<usize> {
    let run_config = RunConfig::load(ctx.fs, &run.config_file())?;
    let batches = plan_batches(
        ctx.fs,
        run,
        &ctx.policy,
        ctx.settings.batch,
        ctx.created_at,
    )?;

    let mut submitted = 0;
    for batch in &batches {
        submit_batch(ctx, batch, &run_config, account).await?;
        submitted += 1;
    }
    Ok(submitted)
}

async fn submit_batch(
    ctx: &StageContext<'_>,
    batch: &Batch,
    run_config: &RunConfig,
    account: Option<&str>,
) -> Result<()> {
    let script = basecalling_script(
        batch,
        run_config,
        &ctx.settings.scheduler,
        account,
        &ctx.settings.mail_users,
    );

    if ctx.dry_run() {
        info!(
            batch_id = %batch.id,
            files = batch.files.len(),
            script = ?batch.script_file(),
            "dry run: would submit basecalling batch"
        );
        return Ok(());
    }

    batch.setup(ctx.fs)?;
    ctx.fs.write(&batch.script_file(), script.as_bytes())?;

    let job_id = match ctx.scheduler.submit(&batch.script_file()).await {
        Ok(id) => id,
        Err(err) => {
            // Locks stay until recovery sees the batch has no job.
            error!(batch_id = %batch.id, error = %err, "basecalling submission failed");
            return Err(err);
        }
    };
    ctx.fs.write(&batch.job_id_file(), job_id.as_bytes())?;

    info!(batch_id = %batch.id, job_id = %job_id, files = batch.files.len(), "basecalling submitted");
    Ok(())
}
