// tests/site_config.rs

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eldorado::cli::CliArgs;
use eldorado::config::model::DEFAULT_MAX_BATCH_SIZE;
use eldorado::config::{load_and_validate, load_from_path, Settings, SiteConfig};
use eldorado::errors::EldoradoError;
use eldorado::types::TransferCheck;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("Eldorado.toml");
    fs::write(&path, contents).expect("write config");
    path
}

fn args(extra: &[&str]) -> CliArgs {
    let mut argv = vec!["eldorado"];
    argv.extend_from_slice(extra);
    CliArgs::parse_from(argv)
}

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let dir = tempfile::tempdir()?;
    let site = load_and_validate(write_config(&dir, ""))?;

    assert_eq!(site.batch.min_size, 0);
    assert_eq!(site.batch.max_size, DEFAULT_MAX_BATCH_SIZE);
    assert_eq!(site.transfer.check, TransferCheck::Signature);
    assert_eq!(site.transfer.min_age_secs, 1800);
    assert_eq!(site.scheduler.gpu_partition, "gpu");
    assert_eq!(site.scheduler.account, None);
    assert_eq!(site.paths.metadata_command, PathBuf::from("pod5-run-info"));
    Ok(())
}

#[test]
fn sections_are_read() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = write_config(
        &dir,
        r#"
[scheduler]
account = "SiteAcc"
gpu_partition = "gpu-a100"
demux_cpus = 32

[batch]
min_size = 1_000
max_size = 5_000

[transfer]
check = "age"
min_age_secs = 60

[paths]
root_dir = "/data"
pattern = "*/*/*/pod5*"
models_dir = "/models"
project_config = "/etc/eldorado/projects.csv"
"#,
    );
    let site = load_and_validate(&path)?;

    assert_eq!(site.scheduler.account.as_deref(), Some("SiteAcc"));
    assert_eq!(site.scheduler.gpu_partition, "gpu-a100");
    assert_eq!(site.scheduler.demux_cpus, 32);
    assert_eq!(site.scheduler.merging_cpus, 4);
    assert_eq!(site.batch.min_size, 1_000);
    assert_eq!(site.transfer.check, TransferCheck::Age);
    assert_eq!(site.paths.root_dir, Some(PathBuf::from("/data")));
    Ok(())
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = write_config(&dir, "[batch]\nmax_sise = 10\n");
    assert!(matches!(load_from_path(&path), Err(EldoradoError::TomlError(_))));
    Ok(())
}

#[test]
fn validation_errors() -> TestResult {
    let dir = tempfile::tempdir()?;
    let cases = [
        "[batch]\nmax_size = 0\n",
        "[scheduler]\nbasecalling_cpus = 0\n",
        "[scheduler]\ngpu_partition = \"  \"\n",
        "[scheduler]\naccount = \"\"\n",
        "[paths]\npattern = \"\"\n",
    ];
    for case in cases {
        let path = write_config(&dir, case);
        let result = load_and_validate(&path);
        assert!(
            matches!(result, Err(EldoradoError::ConfigError(_))),
            "expected a config error for {case:?}"
        );
    }
    Ok(())
}

#[test]
fn cli_flags_override_site_config() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = write_config(
        &dir,
        "[batch]\nmin_size = 100\n\n[transfer]\nmin_age_secs = 60\n\n[paths]\nroot_dir = \"/site\"\npattern = \"*/pod5\"\nmodels_dir = \"/m\"\nproject_config = \"/p.csv\"\n",
    );
    let site = load_and_validate(&path)?;

    let settings = Settings::resolve(
        &args(&[
            "--root-dir",
            "/cli",
            "--min-batch-size",
            "5",
            "--transfer-check",
            "age",
            "--mail-user",
            "a@example.org",
            "--mail-user",
            "b@example.org",
            "--dry-run",
        ]),
        site,
    )?;

    assert_eq!(settings.root_dir, PathBuf::from("/cli"));
    assert_eq!(settings.pattern, "*/pod5");
    assert_eq!(settings.batch.min_size, 5);
    assert_eq!(settings.batch.max_size, DEFAULT_MAX_BATCH_SIZE);
    assert_eq!(settings.transfer_check, TransferCheck::Age);
    assert_eq!(settings.min_age, Duration::from_secs(60));
    assert_eq!(settings.mail_users, vec!["a@example.org", "b@example.org"]);
    assert!(settings.dry_run);
    Ok(())
}

#[test]
fn missing_required_path_is_an_error() {
    let result = Settings::resolve(
        &args(&["--root-dir", "/r", "--pattern", "*/pod5", "--models-dir", "/m"]),
        SiteConfig::default(),
    );
    let err = result.unwrap_err();
    assert!(err.to_string().contains("--project-config"));
}

#[test]
fn cli_max_batch_size_is_validated() {
    let result = Settings::resolve(
        &args(&[
            "--root-dir",
            "/r",
            "--pattern",
            "*/pod5",
            "--models-dir",
            "/m",
            "--project-config",
            "/p.csv",
            "--max-batch-size",
            "0",
        ]),
        SiteConfig::default(),
    );
    assert!(matches!(result, Err(EldoradoError::ConfigError(_))));
}
