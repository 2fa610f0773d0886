// tests/batch_protocol.rs

mod common;
use crate::common::builders::pod5_bytes;
use crate::common::init_tracing;

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use eldorado::batch::manifest::{parse_manifest, render_manifest};
use eldorado::batch::{
    batch_id, get_unclaimed_files, plan_batches, read_manifest, Batch, BATCH_ID_LEN,
};
use eldorado::config::BatchLimits;
use eldorado::errors::EldoradoError;
use eldorado::fs::mock::MockFileSystem;
use eldorado::fs::FileSystem;
use eldorado::gates::basecalling_is_pending;
use eldorado::run::transfer::TransferPolicy;
use eldorado::run::RunDescriptor;
use eldorado::types::TransferCheck;

type TestResult = Result<(), Box<dyn Error>>;

const INPUT: &str = "/data/PRJ/LIB/run1/pod5";
const PARENT: &str = "/data/PRJ/LIB/run1";

fn setup_run(fs: &MockFileSystem, names: &[&str], payload: usize) -> RunDescriptor {
    for name in names {
        fs.add_file(format!("{INPUT}/{name}"), pod5_bytes(payload));
    }
    RunDescriptor::new(INPUT)
}

fn policy(fs: &MockFileSystem) -> TransferPolicy {
    TransferPolicy::new(TransferCheck::Signature, Duration::from_secs(1800)).at(fs.now())
}

#[test]
fn unclaimed_excludes_locked_and_done_files() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let run = setup_run(&fs, &["a.pod5", "b.pod5", "c.pod5"], 10);

    fs.add_file(run.lock_marker_for(&PathBuf::from("a.pod5")), Vec::new());
    fs.add_file(run.done_marker_for(&PathBuf::from("b.pod5")), Vec::new());

    let unclaimed = get_unclaimed_files(&fs, &run, &policy(&fs))?;
    assert_eq!(unclaimed, vec![PathBuf::from(format!("{INPUT}/c.pod5"))]);
    Ok(())
}

#[test]
fn batch_new_is_pure_and_derives_layout() {
    let fs = MockFileSystem::new();
    let run = RunDescriptor::new(INPUT);
    let files = vec![
        PathBuf::from(format!("{INPUT}/a.pod5")),
        PathBuf::from(format!("{INPUT}/b.pod5")),
    ];

    let batch = Batch::new(&run, files.clone(), 1_700_000_000);

    assert_eq!(batch.id.len(), BATCH_ID_LEN);
    assert_eq!(batch.id, batch_id(&files, 1_700_000_000));
    assert_ne!(batch.id, batch_id(&files, 1_700_000_001));
    assert_eq!(batch.working_dir, run.batches_dir().join(&batch.id));
    assert_eq!(
        batch.lock_files,
        vec![
            run.lock_dir().join("a.pod5.lock"),
            run.lock_dir().join("b.pod5.lock")
        ]
    );
    assert_eq!(batch.done_files[1], run.done_dir().join("b.pod5.done"));
    assert!(fs.files().is_empty());
}

#[test]
fn setup_locks_every_member_and_writes_manifest() -> TestResult {
    let fs = MockFileSystem::new();
    let run = setup_run(&fs, &["a.pod5", "b.pod5"], 10);
    let policy = policy(&fs);

    let files = get_unclaimed_files(&fs, &run, &policy)?;
    let batch = Batch::new(&run, files.clone(), 1);
    batch.setup(&fs)?;

    for lock in &batch.lock_files {
        assert!(fs.exists(lock), "missing lock {lock:?}");
    }
    assert_eq!(read_manifest(&fs, &batch.manifest_file())?, files);
    assert_eq!(
        fs.read_to_string(&batch.manifest_file())?,
        format!("{INPUT}/a.pod5\n{INPUT}/b.pod5\n")
    );

    // Nothing left to claim, so the gate closes.
    assert!(get_unclaimed_files(&fs, &run, &policy)?.is_empty());
    fs.add_file(run.config_file(), b"{}".to_vec());
    assert!(!basecalling_is_pending(&fs, &run, &policy));
    Ok(())
}

#[test]
fn setup_aborts_on_existing_lock() -> TestResult {
    let fs = MockFileSystem::new();
    let run = setup_run(&fs, &["a.pod5", "b.pod5"], 10);
    let files = get_unclaimed_files(&fs, &run, &policy(&fs))?;

    // Another invocation claimed b first.
    fs.add_file(run.lock_marker_for(&files[1]), Vec::new());

    let batch = Batch::new(&run, files.clone(), 1);
    let err = batch.setup(&fs).unwrap_err();
    assert!(matches!(err, EldoradoError::LockConflict(ref p) if *p == run.lock_marker_for(&files[1])));

    // The first lock is left for recovery; no manifest was written.
    assert!(fs.exists(&run.lock_marker_for(&files[0])));
    assert!(!fs.exists(&batch.manifest_file()));
    Ok(())
}

#[test]
fn manifest_round_trip_preserves_order() {
    let files = vec![
        PathBuf::from("/x/z.pod5"),
        PathBuf::from("/x/a.pod5"),
        PathBuf::from("/x/m.pod5"),
    ];
    let text = render_manifest(&files);
    assert!(text.ends_with('\n'));
    assert_eq!(parse_manifest(&text), files);
}

#[test]
fn undersized_selection_waits_until_run_is_finished() -> TestResult {
    let fs = MockFileSystem::new();
    let run = setup_run(&fs, &["a.pod5", "b.pod5"], 100);
    let limits = BatchLimits {
        min_size: 1_000_000,
        max_size: 10_000_000,
    };

    assert!(plan_batches(&fs, &run, &policy(&fs), limits, 1)?.is_empty());

    fs.add_file(
        format!("{PARENT}/final_summary_abc.txt"),
        b"pod5_files_in_final_dest=2\n".to_vec(),
    );
    let batches = plan_batches(&fs, &run, &policy(&fs), limits, 1)?;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].files.len(), 2);
    Ok(())
}

#[test]
fn large_selection_is_split_by_max_size() -> TestResult {
    let fs = MockFileSystem::new();
    // Each file is 116 bytes (two signatures plus payload).
    let run = setup_run(&fs, &["a.pod5", "b.pod5", "c.pod5"], 100);
    let limits = BatchLimits {
        min_size: 0,
        max_size: 250,
    };

    let batches = plan_batches(&fs, &run, &policy(&fs), limits, 7)?;
    let sizes: Vec<usize> = batches.iter().map(|b| b.files.len()).collect();
    assert_eq!(sizes, vec![2, 1]);
    assert_ne!(batches[0].id, batches[1].id);
    Ok(())
}
