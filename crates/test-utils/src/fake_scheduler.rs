use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use eldorado::errors::{EldoradoError, Result};
use eldorado::exec::{JobId, JobScheduler};
use eldorado::fs::FileSystem;
use eldorado::run::{MetadataReader, RunMetadata};

/// A fake scheduler that:
/// - records which scripts were submitted
/// - hands out sequential job ids starting at 1000
/// - keeps every submitted job "queued" until the test finishes it
///
/// Clones share state, so a test can keep a handle after moving one into
/// the pipeline.
#[derive(Debug, Clone, Default)]
pub struct FakeScheduler {
    submitted: Arc<Mutex<Vec<PathBuf>>>,
    queued: Arc<Mutex<HashSet<String>>>,
    next_id: Arc<Mutex<u64>>,
    fail_submit: Arc<Mutex<bool>>,
    fail_query: Arc<Mutex<bool>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<PathBuf> {
        self.submitted.lock().unwrap().clone()
    }

    /// Mark a job id as pending/running.
    pub fn enqueue(&self, job_id: &str) {
        self.queued.lock().unwrap().insert(job_id.to_string());
    }

    /// Drop a job from the queue, as if it finished or was killed.
    pub fn finish(&self, job_id: &str) {
        self.queued.lock().unwrap().remove(job_id);
    }

    pub fn finish_all(&self) {
        self.queued.lock().unwrap().clear();
    }

    pub fn set_fail_submit(&self, fail: bool) {
        *self.fail_submit.lock().unwrap() = fail;
    }

    pub fn set_fail_query(&self, fail: bool) {
        *self.fail_query.lock().unwrap() = fail;
    }
}

impl JobScheduler for FakeScheduler {
    fn submit<'a>(
        &'a self,
        script: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<JobId>> + Send + 'a>> {
        Box::pin(async move {
            if *self.fail_submit.lock().unwrap() {
                return Err(EldoradoError::SchedulerError("submission refused".into()));
            }
            let id = {
                let mut next = self.next_id.lock().unwrap();
                let id = 1000 + *next;
                *next += 1;
                id.to_string()
            };
            self.submitted.lock().unwrap().push(script.to_path_buf());
            self.enqueue(&id);
            Ok(id)
        })
    }

    fn is_queued_or_running<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            if *self.fail_query.lock().unwrap() {
                return Err(EldoradoError::SchedulerError("squeue unavailable".into()));
            }
            Ok(self.queued.lock().unwrap().contains(job_id))
        })
    }
}

/// Returns fixed metadata for every run that has at least one pod5 file
/// with a valid signature.
#[derive(Debug, Clone)]
pub struct FakeMetadataReader {
    metadata: RunMetadata,
}

impl FakeMetadataReader {
    pub fn new(metadata: RunMetadata) -> Self {
        Self { metadata }
    }
}

impl Default for FakeMetadataReader {
    fn default() -> Self {
        Self::new(RunMetadata {
            project_id: "PRJ001".to_string(),
            library_pool_id: "LIB001".to_string(),
            protocol_run_id: "proto-1".to_string(),
            sample_rate: 5000,
            flow_cell_product_code: "FLO-PRO114M".to_string(),
            sequencing_kit: "SQK-NBD114-24".to_string(),
        })
    }
}

impl MetadataReader for FakeMetadataReader {
    fn read_run_metadata<'a>(
        &'a self,
        fs: &'a dyn FileSystem,
        input_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<RunMetadata>> + Send + 'a>> {
        Box::pin(async move {
            eldorado::run::metadata::first_complete_pod5(fs, input_dir)?;
            Ok(self.metadata.clone())
        })
    }
}
