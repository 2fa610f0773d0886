// src/run/metadata.rs

//! Run attributes read from the first complete pod5 file.
//!
//! Parsing pod5 run info needs the pod5 format library, so the production
//! reader delegates to an external helper program that prints the run info
//! of one file as `key=value` lines:
//!
//! ```text
//! project_id=PRJ001
//! library_pool_id=LIB42
//! protocol_run_id=6b7c...
//! sample_rate=5000
//! flow_cell_product_code=FLO-PRO114M
//! sequencing_kit=SQK-NBD114-24
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{EldoradoError, Result};
use crate::fs::FileSystem;
use crate::run::transfer::{has_pod5_signature, list_pod5_files};

/// Default helper program used by [`CommandMetadataReader`].
pub const DEFAULT_METADATA_COMMAND: &str = "pod5-run-info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    pub project_id: String,
    pub library_pool_id: String,
    pub protocol_run_id: String,
    pub sample_rate: u32,
    /// Upper-cased, e.g. `FLO-PRO114M`.
    pub flow_cell_product_code: String,
    /// Upper-cased, e.g. `SQK-NBD114-24`.
    pub sequencing_kit: String,
}

impl RunMetadata {
    /// Parse the `key=value` output of the metadata helper.
    ///
    /// Blank lines and unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let values: HashMap<&str, &str> = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .collect();

        let get = |key: &str| -> Result<String> {
            values
                .get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| EldoradoError::MetadataError(format!("missing key '{key}'")))
        };

        let sample_rate_str = get("sample_rate")?;
        // Some writers print the rate as a float ("5000.0").
        let sample_rate = sample_rate_str
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite() && *r > 0.0)
            .map(|r| r.round() as u32)
            .ok_or_else(|| {
                EldoradoError::MetadataError(format!("invalid sample_rate '{sample_rate_str}'"))
            })?;

        Ok(Self {
            project_id: get("project_id")?,
            library_pool_id: get("library_pool_id")?,
            protocol_run_id: get("protocol_run_id")?,
            sample_rate,
            flow_cell_product_code: get("flow_cell_product_code")?.to_uppercase(),
            sequencing_kit: get("sequencing_kit")?.to_uppercase(),
        })
    }
}

/// Source of run metadata.
///
/// Production code uses [`CommandMetadataReader`]; tests can return fixed
/// values without spawning processes.
pub trait MetadataReader: Send + Sync {
    /// Read the attributes of the run whose pod5 files live in `input_dir`.
    ///
    /// Fails with [`EldoradoError::MetadataNotFound`] when the directory has
    /// no complete pod5 file yet.
    fn read_run_metadata<'a>(
        &'a self,
        fs: &'a dyn FileSystem,
        input_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<RunMetadata>> + Send + 'a>>;
}

/// First pod5 file in `input_dir` (by name) carrying a valid signature.
pub fn first_complete_pod5(fs: &dyn FileSystem, input_dir: &Path) -> Result<PathBuf> {
    list_pod5_files(fs, input_dir)?
        .into_iter()
        .find(|p| has_pod5_signature(fs, p))
        .ok_or_else(|| EldoradoError::MetadataNotFound(input_dir.to_path_buf()))
}

/// Runs `<program> <pod5 file>` and parses its stdout.
#[derive(Debug, Clone)]
pub struct CommandMetadataReader {
    program: PathBuf,
}

impl CommandMetadataReader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandMetadataReader {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_COMMAND)
    }
}

impl MetadataReader for CommandMetadataReader {
    fn read_run_metadata<'a>(
        &'a self,
        fs: &'a dyn FileSystem,
        input_dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<RunMetadata>> + Send + 'a>> {
        Box::pin(async move {
            let pod5 = first_complete_pod5(fs, input_dir)?;
            debug!(file = ?pod5, program = ?self.program, "reading run metadata");

            let output = Command::new(&self.program)
                .arg(&pod5)
                .stdin(Stdio::null())
                .output()
                .await
                .with_context(|| format!("spawning metadata reader {:?}", self.program))?;

            if !output.status.success() {
                return Err(EldoradoError::MetadataError(format!(
                    "{:?} exited with {} for {:?}: {}",
                    self.program,
                    output.status,
                    pod5,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }

            RunMetadata::parse(&String::from_utf8_lossy(&output.stdout))
        })
    }
}
