#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eldorado::batch::read_manifest;
use eldorado::config::model::SchedulerSection;
use eldorado::config::{BatchLimits, RunConfig, Settings};
use eldorado::fs::{FileSystem, RealFileSystem};
use eldorado::run::descriptor::BATCH_MANIFEST;
use eldorado::run::transfer::POD5_SIGNATURE;
use eldorado::run::RunDescriptor;
use eldorado::types::TransferCheck;
use tempfile::TempDir;

pub const BASE_MODEL: &str = "dna_r10.4.1_e8.2_400bps_hac@v4.3.0";

/// Bytes of a complete pod5 file: signature, `payload_len` filler bytes,
/// signature.
pub fn pod5_bytes(payload_len: usize) -> Vec<u8> {
    let mut bytes = POD5_SIGNATURE.to_vec();
    bytes.extend(std::iter::repeat_n(0u8, payload_len));
    bytes.extend_from_slice(&POD5_SIGNATURE);
    bytes
}

/// Bytes of a pod5 file still being written: no trailing signature.
pub fn partial_pod5_bytes(payload_len: usize) -> Vec<u8> {
    let mut bytes = POD5_SIGNATURE.to_vec();
    bytes.extend(std::iter::repeat_n(1u8, payload_len));
    bytes
}

/// A run directory tree on a temporary real filesystem:
///
/// ```text
/// <tmp>/root/PRJ001/LIB001/20240101_FAX00000/pod5/
/// <tmp>/models/
/// <tmp>/bin/dorado
/// ```
pub struct RunFixture {
    dir: TempDir,
    root: PathBuf,
    run: RunDescriptor,
}

impl RunFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().join("root");
        let input = root.join("PRJ001/LIB001/20240101_FAX00000/pod5");
        fs::create_dir_all(&input).expect("create input dir");
        Self {
            run: RunDescriptor::new(&input),
            root,
            dir,
        }
    }

    pub fn fs(&self) -> RealFileSystem {
        RealFileSystem
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pattern(&self) -> &'static str {
        "*/*/*/pod5*"
    }

    pub fn run(&self) -> &RunDescriptor {
        &self.run
    }

    pub fn tmp(&self) -> &Path {
        self.dir.path()
    }

    pub fn add_pod5(&self, name: &str, payload_len: usize) -> PathBuf {
        let path = self.run.input_dir().join(name);
        fs::write(&path, pod5_bytes(payload_len)).expect("write pod5");
        path
    }

    pub fn add_partial_pod5(&self, name: &str, payload_len: usize) -> PathBuf {
        let path = self.run.input_dir().join(name);
        fs::write(&path, partial_pod5_bytes(payload_len)).expect("write partial pod5");
        path
    }

    /// `final_summary_<id>.txt` reporting `count` pod5 files.
    pub fn add_final_summary(&self, count: usize) -> PathBuf {
        let path = self.run.parent_dir().join("final_summary_FAX00000_abc.txt");
        fs::write(
            &path,
            format!("instrument=PC24B\npod5_files_in_final_dest={count}\nfastq_files_in_final_dest=0\n"),
        )
        .expect("write final summary");
        path
    }

    pub fn add_sample_sheet(&self, contents: &str) -> PathBuf {
        let path = self.run.parent_dir().join("sample_sheet_FAX00000_abc.csv");
        fs::write(&path, contents).expect("write sample sheet");
        path
    }

    pub fn touch(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, b"").expect("touch");
    }

    /// Fake dorado binary at `<tmp>/bin/dorado`.
    pub fn dorado(&self) -> PathBuf {
        let path = self.tmp().join("bin").join("dorado");
        if !path.exists() {
            self.touch(&path);
        }
        path
    }

    /// Models dir with the R10.4.1 5 kHz base model and two generations of
    /// its 5mCG_5hmCG model.
    pub fn models_dir(&self) -> PathBuf {
        let dir = self.tmp().join("models");
        for name in [
            BASE_MODEL.to_string(),
            format!("{BASE_MODEL}_5mCG_5hmCG@v1"),
            format!("{BASE_MODEL}_5mCG_5hmCG@v2"),
        ] {
            fs::create_dir_all(dir.join(name)).expect("create model dir");
        }
        dir
    }

    /// Project CSV with a default row and one project row.
    pub fn project_csv(&self) -> PathBuf {
        let path = self.tmp().join("projects.csv");
        let dorado = self.dorado();
        fs::write(
            &path,
            format!(
                "project_id,account,dorado_executable,basecalling_model,mod_5mcg_5hmcg,mod_6ma\n\
                 default,DefaultAccount,{},auto,0,0\n\
                 PRJ001,ProjectAccount,,,1,0\n",
                dorado.display()
            ),
        )
        .expect("write project csv");
        path
    }

    /// Persist a run config the way the first pass would.
    pub fn write_run_config(&self) -> RunConfig {
        let config = RunConfig {
            dorado_executable: self.dorado(),
            basecalling_model: self.models_dir().join(BASE_MODEL),
            modification_models: vec![],
        };
        config
            .save(&RealFileSystem, &self.run.config_file())
            .expect("save run config");
        config
    }

    /// Batch directories that have a manifest.
    pub fn batch_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.run.batches_dir()) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.join(BATCH_MANIFEST).is_file())
            .collect();
        dirs.sort();
        dirs
    }

    /// Do what a successful basecalling job does for every batch: write the
    /// bam and log, touch done markers and `batch.done`, remove locks.
    pub fn complete_batches(&self) {
        let fs_impl = RealFileSystem;
        for dir in self.batch_dirs() {
            let files = read_manifest(&fs_impl, &dir.join(BATCH_MANIFEST)).expect("read manifest");
            for file in &files {
                self.touch(&self.run.done_marker_for(file));
                let lock = self.run.lock_marker_for(file);
                if lock.exists() {
                    fs::remove_file(lock).expect("remove lock");
                }
            }
            fs::write(dir.join("basecalled.bam"), b"BAM").expect("write bam");
            fs::write(
                dir.join("basecalled.txt"),
                format!("slurm_job_id=1\npod5_file_count={}\n", files.len()),
            )
            .expect("write batch log");
            self.touch(&dir.join("batch.done"));
        }
    }

    /// Do what a successful merge job does.
    pub fn complete_merge(&self) {
        fs::create_dir_all(self.run.merge_dir()).expect("create merge dir");
        fs::write(self.run.merged_bam(), b"MERGED").expect("write merged bam");
        self.touch(&self.run.merge_done());
        let _ = fs::remove_file(self.run.merge_lock());
    }

    pub fn exists(&self, path: &Path) -> bool {
        RealFileSystem.exists(path)
    }
}

impl Default for RunFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `Settings` to simplify test setup.
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new(fixture: &RunFixture) -> Self {
        Self {
            settings: Settings {
                root_dir: fixture.root().to_path_buf(),
                pattern: fixture.pattern().to_string(),
                project_config: fixture.project_csv(),
                models_dir: fixture.models_dir(),
                metadata_command: PathBuf::from("unused"),
                mail_users: vec![],
                batch: BatchLimits::default(),
                transfer_check: TransferCheck::Signature,
                min_age: Duration::from_secs(1800),
                scheduler: SchedulerSection::default(),
                dry_run: false,
            },
        }
    }

    pub fn min_batch_size(mut self, bytes: u64) -> Self {
        self.settings.batch.min_size = bytes;
        self
    }

    pub fn max_batch_size(mut self, bytes: u64) -> Self {
        self.settings.batch.max_size = bytes;
        self
    }

    pub fn mail_user(mut self, user: &str) -> Self {
        self.settings.mail_users.push(user.to_string());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.settings.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}
