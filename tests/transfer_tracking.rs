// tests/transfer_tracking.rs

mod common;
use crate::common::init_tracing;
use crate::common::builders::{partial_pod5_bytes, pod5_bytes};

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use eldorado::fs::mock::MockFileSystem;
use eldorado::run::transfer::{
    are_all_files_transferred, get_transferred_files, has_pod5_signature, is_file_inactive,
    parse_expected_file_count, TransferPolicy, POD5_SIGNATURE,
};
use eldorado::run::RunDescriptor;
use eldorado::types::TransferCheck;

type TestResult = Result<(), Box<dyn Error>>;

const INPUT: &str = "/data/PRJ/LIB/run1/pod5";

fn signature_policy(fs: &MockFileSystem) -> TransferPolicy {
    TransferPolicy::new(TransferCheck::Signature, Duration::from_secs(1800)).at(fs.now())
}

#[test]
fn signature_requires_both_ends() {
    init_tracing();
    let fs = MockFileSystem::new();

    fs.add_file("/d/complete.pod5", pod5_bytes(100));
    fs.add_file("/d/partial.pod5", partial_pod5_bytes(100));
    fs.add_file("/d/exact.pod5", POD5_SIGNATURE.to_vec());
    fs.add_file("/d/short.pod5", POD5_SIGNATURE[..7].to_vec());
    fs.add_file("/d/empty.pod5", Vec::new());

    assert!(has_pod5_signature(&fs, Path::new("/d/complete.pod5")));
    assert!(!has_pod5_signature(&fs, Path::new("/d/partial.pod5")));
    assert!(has_pod5_signature(&fs, Path::new("/d/exact.pod5")));
    assert!(!has_pod5_signature(&fs, Path::new("/d/short.pod5")));
    assert!(!has_pod5_signature(&fs, Path::new("/d/empty.pod5")));
    assert!(!has_pod5_signature(&fs, Path::new("/d/missing.pod5")));
}

#[test]
fn age_check_uses_strict_threshold() {
    let fs = MockFileSystem::new();
    fs.add_file("/d/a.pod5", b"x".to_vec());
    let min_age = Duration::from_secs(1800);

    assert!(!is_file_inactive(&fs, Path::new("/d/a.pod5"), min_age, fs.now()));

    fs.advance(Duration::from_secs(1800));
    assert!(!is_file_inactive(&fs, Path::new("/d/a.pod5"), min_age, fs.now()));

    fs.advance(Duration::from_secs(1));
    assert!(is_file_inactive(&fs, Path::new("/d/a.pod5"), min_age, fs.now()));

    assert!(!is_file_inactive(&fs, Path::new("/d/missing.pod5"), min_age, fs.now()));
}

#[test]
fn transferred_files_follow_acquisition_order() -> TestResult {
    let fs = MockFileSystem::new();
    let run = RunDescriptor::new(INPUT);

    // Written out of name order; "c" is oldest.
    fs.add_file(format!("{INPUT}/c.pod5"), pod5_bytes(10));
    fs.advance(Duration::from_secs(5));
    fs.add_file(format!("{INPUT}/b.pod5"), pod5_bytes(10));
    fs.add_file(format!("{INPUT}/a.pod5"), pod5_bytes(10));
    fs.add_file(format!("{INPUT}/z.pod5"), partial_pod5_bytes(10));
    fs.add_file(format!("{INPUT}/notes.txt"), b"hello".to_vec());

    let files = get_transferred_files(&fs, &run, &signature_policy(&fs))?;
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["c.pod5", "a.pod5", "b.pod5"]);
    Ok(())
}

#[test]
fn parses_expected_count_from_final_summary() {
    assert_eq!(
        parse_expected_file_count("a=1\npod5_files_in_final_dest=42\nb=2\n"),
        Some(42)
    );
    assert_eq!(parse_expected_file_count("pod5_files_in_final_dest=\n"), None);
    assert_eq!(parse_expected_file_count("nothing here"), None);
}

#[test]
fn all_files_transferred_needs_summary_and_matching_count() {
    let fs = MockFileSystem::new();
    let run = RunDescriptor::new(INPUT);
    let policy = signature_policy(&fs);

    fs.add_file(format!("{INPUT}/a.pod5"), pod5_bytes(10));
    fs.add_file(format!("{INPUT}/b.pod5"), pod5_bytes(10));

    // No summary yet.
    assert!(!are_all_files_transferred(&fs, &run, &policy));

    // Summary without the key.
    fs.add_file("/data/PRJ/LIB/run1/final_summary_x.txt", b"instrument=1\n".to_vec());
    assert!(!are_all_files_transferred(&fs, &run, &policy));

    // Count mismatch.
    fs.add_file(
        "/data/PRJ/LIB/run1/final_summary_x.txt",
        b"pod5_files_in_final_dest=3\n".to_vec(),
    );
    assert!(!are_all_files_transferred(&fs, &run, &policy));

    fs.add_file(format!("{INPUT}/c.pod5"), pod5_bytes(10));
    assert!(are_all_files_transferred(&fs, &run, &policy));
}

#[test]
fn partial_file_does_not_count_as_transferred() {
    let fs = MockFileSystem::new();
    let run = RunDescriptor::new(INPUT);

    fs.add_file(format!("{INPUT}/a.pod5"), pod5_bytes(10));
    fs.add_file(format!("{INPUT}/b.pod5"), partial_pod5_bytes(10));
    fs.add_file(
        "/data/PRJ/LIB/run1/final_summary_x.txt",
        b"pod5_files_in_final_dest=2\n".to_vec(),
    );

    assert!(!are_all_files_transferred(&fs, &run, &signature_policy(&fs)));

    // The age check accepts it once it has been quiet long enough.
    fs.advance(Duration::from_secs(3600));
    let age = TransferPolicy::new(TransferCheck::Age, Duration::from_secs(1800)).at(fs.now());
    assert!(are_all_files_transferred(&fs, &run, &age));
}
