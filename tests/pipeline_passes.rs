// tests/pipeline_passes.rs

mod common;
use crate::common::builders::BASE_MODEL;
use crate::common::{
    init_tracing, with_timeout, FakeMetadataReader, FakeScheduler, RunFixture, SettingsBuilder,
};

use std::error::Error;
use std::fs;
use std::sync::Arc;

use eldorado::config::{load_project_configs, RunConfig, Settings};
use eldorado::engine::{PassReport, Pipeline, RunOutcome};
use eldorado::fs::{FileSystem, RealFileSystem};
use eldorado::stages::demultiplexing::DemuxAction;

type TestResult = Result<(), Box<dyn Error>>;

const SHEET: &str = "flow_cell_id,kit,barcode,alias\nFAX00000,SQK-NBD114-24,barcode01,sample_a\n";

fn pipeline(
    settings: Settings,
    scheduler: &FakeScheduler,
) -> Pipeline<FakeScheduler, FakeMetadataReader> {
    let projects =
        load_project_configs(&RealFileSystem, &settings.project_config).expect("load projects");
    Pipeline::new(
        Arc::new(RealFileSystem),
        scheduler.clone(),
        FakeMetadataReader::default(),
        settings,
        projects,
    )
}

async fn pass(p: &Pipeline<FakeScheduler, FakeMetadataReader>) -> PassReport {
    with_timeout(p.run_pass()).await.expect("pass")
}

#[tokio::test]
async fn run_goes_from_raw_files_to_cleaned_up() -> TestResult {
    init_tracing();
    let fixture = RunFixture::new();
    fixture.add_pod5("a.pod5", 100);
    fixture.add_pod5("b.pod5", 100);
    let scheduler = FakeScheduler::new();
    let p = pipeline(SettingsBuilder::new(&fixture).build(), &scheduler);
    let run = fixture.run();
    let input = run.input_dir();

    // Pass 1: config written, one batch claiming both files.
    let report = pass(&p).await;
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.outcome_for(input), Some(&RunOutcome::Basecalling { batches: 1 }));

    let config = RunConfig::load(&RealFileSystem, &run.config_file())?;
    assert_eq!(config.basecalling_model, fixture.models_dir().join(BASE_MODEL));
    assert_eq!(
        config.modification_models,
        vec![fixture.models_dir().join(format!("{BASE_MODEL}_5mCG_5hmCG@v2"))]
    );

    let batches = fixture.batch_dirs();
    assert_eq!(batches.len(), 1);
    assert!(fixture.exists(&run.lock_marker_for(&input.join("a.pod5"))));
    assert!(fixture.exists(&run.lock_marker_for(&input.join("b.pod5"))));
    let script = fs::read_to_string(batches[0].join("run_basecaller.sh"))?;
    assert!(script.contains("#SBATCH --account         ProjectAccount"));
    assert!(script.contains("--modified-bases-models"));
    assert!(script.contains("echo \"bam_read_count=$(samtools view -c "));

    // Pass 2: job still queued, nothing to do and nothing reclaimed.
    let report = pass(&p).await;
    assert_eq!(report.outcome_for(input), Some(&RunOutcome::Idle));
    assert!(fixture.exists(&run.lock_marker_for(&input.join("a.pod5"))));
    assert_eq!(scheduler.submitted().len(), 1);

    // Basecalling finishes, but the instrument has not reported completion.
    fixture.complete_batches();
    scheduler.finish_all();
    let report = pass(&p).await;
    assert_eq!(report.outcome_for(input), Some(&RunOutcome::Idle));

    // Pass 3: final summary present, merge submitted.
    fixture.add_final_summary(2);
    let report = pass(&p).await;
    assert_eq!(report.outcome_for(input), Some(&RunOutcome::Merging));
    assert!(fixture.exists(&run.merge_lock()));
    assert_eq!(scheduler.submitted().len(), 2);

    // Pass 4: merge still running.
    let report = pass(&p).await;
    assert_eq!(report.outcome_for(input), Some(&RunOutcome::Idle));
    assert!(fixture.exists(&run.merge_lock()));

    // Pass 5: merge done, demultiplexing submitted.
    fixture.complete_merge();
    fixture.add_sample_sheet(SHEET);
    scheduler.finish_all();
    let report = pass(&p).await;
    assert_eq!(
        report.outcome_for(input),
        Some(&RunOutcome::Demultiplexing(DemuxAction::Submitted))
    );
    assert_eq!(scheduler.submitted().last(), Some(&run.demux_script()));

    // Pass 6: demux job completes, run is cleaned up.
    fixture.touch(&run.demux_done());
    fs::remove_file(run.demux_lock())?;
    scheduler.finish_all();
    let report = pass(&p).await;
    assert_eq!(report.outcome_for(input), Some(&RunOutcome::Cleanup));
    assert!(fixture.exists(&run.summary_csv()));
    assert!(fixture.exists(&run.cleanup_done()));
    assert!(!fixture.exists(run.batches_dir()));

    // Pass 7: finished runs are no longer discovered.
    let report = pass(&p).await;
    assert!(report.outcomes.is_empty());
    assert!(report.failures.is_empty());
    Ok(())
}

#[tokio::test]
async fn dry_run_leaves_no_trace() -> TestResult {
    let fixture = RunFixture::new();
    fixture.add_pod5("a.pod5", 10);
    let scheduler = FakeScheduler::new();
    let p = pipeline(SettingsBuilder::new(&fixture).dry_run(true).build(), &scheduler);

    let report = pass(&p).await;
    assert_eq!(report.outcome_for(fixture.run().input_dir()), Some(&RunOutcome::ConfigPending));
    assert!(!fixture.exists(fixture.run().output_dir()));
    assert!(scheduler.submitted().is_empty());

    // With a config in place a dry run still plans batches without claiming.
    fixture.write_run_config();
    let report = pass(&p).await;
    assert_eq!(
        report.outcome_for(fixture.run().input_dir()),
        Some(&RunOutcome::Basecalling { batches: 1 })
    );
    assert!(fixture.batch_dirs().is_empty());
    assert!(!fixture.exists(fixture.run().lock_dir()));
    assert!(scheduler.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_submission_is_recovered_next_pass() -> TestResult {
    let fixture = RunFixture::new();
    fixture.add_pod5("a.pod5", 10);
    let scheduler = FakeScheduler::new();
    let p = pipeline(SettingsBuilder::new(&fixture).build(), &scheduler);
    let run = fixture.run();
    let lock = run.lock_marker_for(&run.input_dir().join("a.pod5"));

    scheduler.set_fail_submit(true);
    let report = pass(&p).await;
    assert_eq!(report.failures.len(), 1);
    assert!(fixture.exists(&lock));
    let stalled = fixture.batch_dirs();
    assert_eq!(stalled.len(), 1);

    scheduler.set_fail_submit(false);
    let report = pass(&p).await;
    assert_eq!(report.outcome_for(run.input_dir()), Some(&RunOutcome::Basecalling { batches: 1 }));
    assert!(fixture.exists(&lock));
    assert_eq!(scheduler.submitted().len(), 1);
    Ok(())
}

#[tokio::test]
async fn one_failing_run_does_not_stop_others() -> TestResult {
    let fixture = RunFixture::new();
    fixture.add_pod5("a.pod5", 10);

    // A second run whose only file is still being written has no metadata.
    let other = fixture.root().join("PRJ001/LIB002/20240102_FAX00001/pod5");
    fs::create_dir_all(&other)?;
    fs::write(other.join("x.pod5"), common::builders::partial_pod5_bytes(10))?;

    let scheduler = FakeScheduler::new();
    let p = pipeline(SettingsBuilder::new(&fixture).build(), &scheduler);

    let report = pass(&p).await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, other);
    assert_eq!(
        report.outcome_for(fixture.run().input_dir()),
        Some(&RunOutcome::Basecalling { batches: 1 })
    );
    assert!(!RealFileSystem.exists(&other.parent().expect("parent").join("bam_eldorado/dorado_config.json")));
    Ok(())
}
