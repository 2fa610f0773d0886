// src/stages/demultiplexing.rs

use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::errors::{EldoradoError, Result};
use crate::fs::FileSystem;
use crate::run::transfer::find_sample_sheet;
use crate::run::{RunDescriptor, RunMetadata};
use crate::stages::scripts::demultiplexing_script;
use crate::stages::StageContext;

/// Sequencing kits with barcodes dorado can demultiplex.
pub const BARCODING_KITS: &[&str] = &[
    "EXP-NBD103",
    "EXP-NBD104",
    "EXP-NBD114",
    "EXP-NBD196",
    "EXP-PBC001",
    "EXP-PBC096",
    "SQK-16S024",
    "SQK-16S114-24",
    "SQK-LWB001",
    "SQK-MLK111-96-XL",
    "SQK-MLK114-96-XL",
    "SQK-NBD111-24",
    "SQK-NBD111-96",
    "SQK-NBD114-24",
    "SQK-NBD114-96",
    "SQK-PBK004",
    "SQK-PCB109",
    "SQK-PCB110",
    "SQK-PCB111-24",
    "SQK-PCB114-24",
    "SQK-RAB201",
    "SQK-RAB204",
    "SQK-RBK001",
    "SQK-RBK004",
    "SQK-RBK110-96",
    "SQK-RBK111-24",
    "SQK-RBK111-96",
    "SQK-RBK114-24",
    "SQK-RBK114-96",
    "SQK-RLB001",
    "SQK-RPB004",
    "SQK-RPB114-24",
    "VSK-PTC001",
    "VSK-VMK001",
    "VSK-VMK004",
    "VSK-VPS001",
];

pub fn is_barcoding_kit(kit: &str) -> bool {
    BARCODING_KITS.contains(&kit)
}

/// True if the sample sheet header has both `barcode` and `alias` columns.
pub fn sample_sheet_has_alias_and_barcode(fs: &dyn FileSystem, sample_sheet: &Path) -> Result<bool> {
    let text = fs.read_to_string(sample_sheet)?;
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?;
    let has = |name: &str| headers.iter().any(|h| h == name);
    Ok(has("barcode") && has("alias"))
}

/// Where the merged bam goes when the run is not demultiplexed.
pub fn undemultiplexed_bam(run: &RunDescriptor, metadata: &RunMetadata) -> PathBuf {
    run.output_dir().join(format!("{}.bam", metadata.library_pool_id))
}

/// What [`process_demultiplexing`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxAction {
    Submitted,
    /// No barcodes to split by; the merged bam is the final output.
    Skipped { output: PathBuf },
}

/// Demultiplex the merged bam, or move it into place as the final output
/// when the run has no usable barcodes.
pub async fn process_demultiplexing(
    ctx: &StageContext<'_>,
    run: &RunDescriptor,
    metadata: &RunMetadata,
    account: Option<&str>,
) -> Result<DemuxAction> {
    let output = undemultiplexed_bam(run, metadata);
    if !ctx.fs.exists(&run.merged_bam()) && ctx.fs.is_file(&output) {
        if ctx.dry_run() {
            info!(output = ?output, "dry run: would finish skipped demultiplexing");
        } else {
            ctx.fs.create_new(&run.demux_done())?;
            info!(output = ?output, "finished skipped demultiplexing");
        }
        return Ok(DemuxAction::Skipped { output });
    }

    let sample_sheet = find_sample_sheet(ctx.fs, run).ok_or_else(|| {
        EldoradoError::SampleSheetError(format!(
            "no sample_sheet*.csv in {:?}",
            run.parent_dir()
        ))
    })?;

    let mut skip = false;
    if !sample_sheet_has_alias_and_barcode(ctx.fs, &sample_sheet)? {
        error!(sample_sheet = ?sample_sheet, "sample sheet lacks 'barcode' and 'alias' columns");
        skip = true;
    }
    if !is_barcoding_kit(&metadata.sequencing_kit) {
        info!(kit = %metadata.sequencing_kit, "not a barcoding kit");
        skip = true;
    }

    if skip {
        if ctx.dry_run() {
            info!(output = ?output, "dry run: would use merged bam as final output");
        } else {
            ctx.fs.rename(&run.merged_bam(), &output)?;
            ctx.fs.create_new(&run.demux_done())?;
            info!(output = ?output, "demultiplexing skipped, merged bam is the final output");
        }
        return Ok(DemuxAction::Skipped { output });
    }

    let run_config = RunConfig::load(ctx.fs, &run.config_file())?;
    let script = demultiplexing_script(
        run,
        &run_config,
        &sample_sheet,
        &metadata.sequencing_kit,
        &ctx.settings.scheduler,
        account,
        &ctx.settings.mail_users,
    );

    if ctx.dry_run() {
        info!(run = ?run.input_dir(), kit = %metadata.sequencing_kit, "dry run: would submit demultiplexing");
        return Ok(DemuxAction::Submitted);
    }

    if !ctx.fs.create_new(&run.demux_lock())? {
        return Err(EldoradoError::LockConflict(run.demux_lock()));
    }
    ctx.fs.write(&run.demux_script(), script.as_bytes())?;

    let job_id = ctx.scheduler.submit(&run.demux_script()).await?;
    ctx.fs.write(&run.demux_job_id_file(), job_id.as_bytes())?;

    info!(run = ?run.input_dir(), job_id = %job_id, "demultiplexing submitted");
    Ok(DemuxAction::Submitted)
}
