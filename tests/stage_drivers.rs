// tests/stage_drivers.rs

mod common;
use crate::common::{init_tracing, with_timeout, FakeScheduler, RunFixture, SettingsBuilder};

use std::error::Error;
use std::fs;

use eldorado::batch::Batch;
use eldorado::config::Settings;
use eldorado::errors::EldoradoError;
use eldorado::fs::{FileSystem, RealFileSystem};
use eldorado::gates::{demultiplexing_is_pending, demux_skip_interrupted};
use eldorado::run::RunMetadata;
use eldorado::stages::cleanup::{parse_batch_log, process_cleanup, render_summary_csv};
use eldorado::stages::demultiplexing::{
    is_barcoding_kit, process_demultiplexing, sample_sheet_has_alias_and_barcode, DemuxAction,
};
use eldorado::stages::merging::process_merging;
use eldorado::stages::StageContext;

type TestResult = Result<(), Box<dyn Error>>;

const SHEET: &str = "flow_cell_id,kit,barcode,alias\nFAX00000,SQK-NBD114-24,barcode01,sample_a\n";

fn context<'a>(fs: &'a RealFileSystem, scheduler: &'a FakeScheduler, settings: &'a Settings) -> StageContext<'a> {
    StageContext {
        fs,
        scheduler,
        settings,
        policy: settings.transfer_policy(),
        created_at: 1_700_000_000,
    }
}

fn metadata(kit: &str) -> RunMetadata {
    RunMetadata {
        project_id: "PRJ001".into(),
        library_pool_id: "LIB001".into(),
        protocol_run_id: "proto-1".into(),
        sample_rate: 5000,
        flow_cell_product_code: "FLO-PRO114M".into(),
        sequencing_kit: kit.into(),
    }
}

/// A run whose two files were basecalled in one finished batch.
fn basecalled_fixture() -> RunFixture {
    let fixture = RunFixture::new();
    let a = fixture.add_pod5("a.pod5", 10);
    let b = fixture.add_pod5("b.pod5", 10);
    fixture.write_run_config();
    Batch::new(fixture.run(), vec![a, b], 1)
        .setup(&RealFileSystem)
        .expect("setup batch");
    fixture.complete_batches();
    fixture
}

#[tokio::test]
async fn merging_claims_lock_and_submits() -> TestResult {
    init_tracing();
    let fixture = basecalled_fixture();
    let settings = SettingsBuilder::new(&fixture).mail_user("ops@example.org").build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);
    let run = fixture.run();

    with_timeout(process_merging(&ctx, run, Some("Acc"))).await?;

    assert!(fixture.exists(&run.merge_lock()));
    assert_eq!(scheduler.submitted(), vec![run.merge_script()]);
    assert_eq!(fs.read_to_string(&run.merge_job_id_file())?, "1000");

    let script = fs.read_to_string(&run.merge_script())?;
    assert!(script.contains("#SBATCH --account         Acc"));
    assert!(script.contains("#SBATCH --mail-user       ops@example.org"));
    assert!(script.contains("samtools merge"));
    assert!(script.contains("basecalled.bam"));

    // A second attempt in the same state loses the lock race.
    let err = process_merging(&ctx, run, None).await.unwrap_err();
    assert!(matches!(err, EldoradoError::LockConflict(_)));
    assert_eq!(scheduler.submitted().len(), 1);
    Ok(())
}

#[tokio::test]
async fn merging_without_outputs_fails() {
    let fixture = RunFixture::new();
    let settings = SettingsBuilder::new(&fixture).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);

    let err = process_merging(&ctx, fixture.run(), None).await.unwrap_err();
    assert!(matches!(err, EldoradoError::NothingToMerge(_)), "{err}");
    assert!(!fixture.exists(&fixture.run().merge_lock()));
    assert!(scheduler.submitted().is_empty());
}

#[tokio::test]
async fn barcoded_run_is_demultiplexed() -> TestResult {
    let fixture = basecalled_fixture();
    fixture.complete_merge();
    fixture.add_sample_sheet(SHEET);
    let settings = SettingsBuilder::new(&fixture).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);
    let run = fixture.run();

    let action = process_demultiplexing(&ctx, run, &metadata("SQK-NBD114-24"), None).await?;

    assert_eq!(action, DemuxAction::Submitted);
    assert!(fixture.exists(&run.demux_lock()));
    assert_eq!(scheduler.submitted(), vec![run.demux_script()]);
    let script = fs.read_to_string(&run.demux_script())?;
    assert!(script.contains("--kit-name SQK-NBD114-24"));
    assert!(script.contains("sample_sheet_FAX00000_abc.csv"));
    assert!(!script.contains("--account"));
    // The merged bam stays until cleanup.
    assert!(fixture.exists(&run.merged_bam()));
    Ok(())
}

#[tokio::test]
async fn unbarcoded_run_promotes_merged_bam() -> TestResult {
    let fixture = basecalled_fixture();
    fixture.complete_merge();
    fixture.add_sample_sheet(SHEET);
    let settings = SettingsBuilder::new(&fixture).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);
    let run = fixture.run();

    let action = process_demultiplexing(&ctx, run, &metadata("SQK-LSK114"), None).await?;

    let expected = run.output_dir().join("LIB001.bam");
    assert_eq!(action, DemuxAction::Skipped { output: expected.clone() });
    assert!(!fixture.exists(&run.merged_bam()));
    assert_eq!(fs::read(&expected)?, b"MERGED");
    assert!(fixture.exists(&run.demux_done()));
    assert!(scheduler.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn interrupted_skip_is_finished_next_time() -> TestResult {
    let fixture = basecalled_fixture();
    fixture.complete_merge();
    fixture.add_sample_sheet(SHEET);
    let settings = SettingsBuilder::new(&fixture).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);
    let run = fixture.run();
    let unbarcoded = metadata("SQK-LSK114");

    process_demultiplexing(&ctx, run, &unbarcoded, None).await?;
    // The bam was moved but demux.done never made it to disk.
    fs::remove_file(run.demux_done())?;
    assert!(demux_skip_interrupted(&fs, run));
    assert!(demultiplexing_is_pending(&fs, run));

    let action = process_demultiplexing(&ctx, run, &unbarcoded, None).await?;
    let expected = run.output_dir().join("LIB001.bam");
    assert_eq!(action, DemuxAction::Skipped { output: expected.clone() });
    assert_eq!(fs::read(&expected)?, b"MERGED");
    assert!(fixture.exists(&run.demux_done()));
    assert!(!demultiplexing_is_pending(&fs, run));
    assert!(scheduler.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn sample_sheet_without_alias_skips_demux() -> TestResult {
    let fixture = basecalled_fixture();
    fixture.complete_merge();
    fixture.add_sample_sheet("flow_cell_id,kit,barcode\nFAX00000,SQK-NBD114-24,barcode01\n");
    let settings = SettingsBuilder::new(&fixture).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);

    let action = process_demultiplexing(&ctx, fixture.run(), &metadata("SQK-NBD114-24"), None).await?;
    assert!(matches!(action, DemuxAction::Skipped { .. }));
    assert!(scheduler.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_sample_sheet_is_an_error() {
    let fixture = basecalled_fixture();
    fixture.complete_merge();
    let settings = SettingsBuilder::new(&fixture).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);

    let err = process_demultiplexing(&ctx, fixture.run(), &metadata("SQK-NBD114-24"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EldoradoError::SampleSheetError(_)));
    assert!(fixture.exists(&fixture.run().merged_bam()));
}

#[tokio::test]
async fn dry_run_demux_changes_nothing() -> TestResult {
    let fixture = basecalled_fixture();
    fixture.complete_merge();
    fixture.add_sample_sheet(SHEET);
    let settings = SettingsBuilder::new(&fixture).dry_run(true).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);
    let run = fixture.run();

    process_demultiplexing(&ctx, run, &metadata("SQK-LSK114"), None).await?;
    process_demultiplexing(&ctx, run, &metadata("SQK-NBD114-24"), None).await?;

    assert!(fixture.exists(&run.merged_bam()));
    assert!(!fixture.exists(&run.demux_done()));
    assert!(!fixture.exists(&run.demux_lock()));
    assert!(scheduler.submitted().is_empty());
    Ok(())
}

#[test]
fn barcoding_kits_and_sheet_columns() -> TestResult {
    assert!(is_barcoding_kit("SQK-RBK114-96"));
    assert!(!is_barcoding_kit("SQK-LSK114"));

    let fixture = RunFixture::new();
    let sheet = fixture.add_sample_sheet(" barcode , alias ,kit\n");
    assert!(sample_sheet_has_alias_and_barcode(&RealFileSystem, &sheet)?);
    Ok(())
}

#[test]
fn summary_csv_takes_union_of_keys() -> TestResult {
    let logs = vec![
        parse_batch_log("slurm_job_id=1\npod5_file_count=2\n"),
        parse_batch_log("slurm_job_id=2\nruntime=30\n\nnot a pair\n"),
    ];
    assert_eq!(
        render_summary_csv(&logs)?,
        "slurm_job_id,pod5_file_count,runtime\n1,2,\n2,,30\n"
    );
    assert_eq!(render_summary_csv(&[])?, "\n");
    Ok(())
}

#[test]
fn cleanup_writes_summary_and_removes_intermediates() -> TestResult {
    let fixture = basecalled_fixture();
    fixture.complete_merge();
    let run = fixture.run();
    fixture.touch(&run.demux_done());
    let settings = SettingsBuilder::new(&fixture).build();
    let scheduler = FakeScheduler::new();
    let fs = RealFileSystem;
    let ctx = context(&fs, &scheduler, &settings);

    process_cleanup(&ctx, run)?;

    let summary = fs.read_to_string(&run.summary_csv())?;
    assert!(summary.starts_with("slurm_job_id,pod5_file_count\n"));
    assert!(summary.contains("1,2\n"));
    assert!(!fixture.exists(run.batches_dir()));
    assert!(!fixture.exists(&run.merged_bam()));
    assert!(fixture.exists(&run.cleanup_done()));
    // Markers stay so a rerun cannot pick the files up again.
    assert!(fixture.exists(&run.done_marker_for(&run.input_dir().join("a.pod5"))));
    Ok(())
}
