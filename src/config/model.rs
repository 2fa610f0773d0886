// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::run::metadata::DEFAULT_METADATA_COMMAND;
use crate::types::TransferCheck;

/// Site configuration as read from an `Eldorado.toml` file.
///
/// ```toml
/// [scheduler]
/// account = "MyAccount"
/// basecalling_walltime = "7-00:00:00"
/// gpu_partition = "gpu"
///
/// [batch]
/// min_size = 0
/// max_size = 10_000_000_000
///
/// [transfer]
/// check = "signature"
/// min_age_secs = 1800
///
/// [paths]
/// models_dir = "/faststorage/dorado/models"
/// project_config = "/faststorage/dorado/projects.csv"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawSiteConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub batch: BatchSection,

    #[serde(default)]
    pub transfer: TransferSection,

    #[serde(default)]
    pub paths: PathsSection,
}

/// Validated site configuration.
///
/// Only constructed through `TryFrom<RawSiteConfig>` (see `validate.rs`) or
/// [`SiteConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct SiteConfig {
    pub scheduler: SchedulerSection,
    pub batch: BatchSection,
    pub transfer: TransferSection,
    pub paths: PathsSection,
}

impl SiteConfig {
    pub(crate) fn new_unchecked(raw: RawSiteConfig) -> Self {
        Self {
            scheduler: raw.scheduler,
            batch: raw.batch,
            transfer: raw.transfer,
            paths: raw.paths,
        }
    }
}

/// `[scheduler]` section: resources requested for each stage's job.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    /// Fallback account when a project row has none.
    pub account: Option<String>,

    pub basecalling_walltime: String,
    pub basecalling_cpus: u32,
    pub basecalling_mem: String,
    pub gpu_partition: String,
    pub gpu_gres: String,

    pub merging_walltime: String,
    pub merging_cpus: u32,
    pub merging_mem: String,

    pub demux_walltime: String,
    pub demux_cpus: u32,
    pub demux_mem: String,

    /// Program names; override when the SLURM tools are not on `PATH`.
    pub sbatch: String,
    pub squeue: String,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            account: None,
            basecalling_walltime: "7-00:00:00".to_string(),
            basecalling_cpus: 2,
            basecalling_mem: "32g".to_string(),
            gpu_partition: "gpu".to_string(),
            gpu_gres: "gpu:1".to_string(),
            merging_walltime: "12:00:00".to_string(),
            merging_cpus: 4,
            merging_mem: "32g".to_string(),
            demux_walltime: "12:00:00".to_string(),
            demux_cpus: 16,
            demux_mem: "128g".to_string(),
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
        }
    }
}

/// `[batch]` section. Sizes are in bytes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSection {
    pub min_size: u64,
    pub max_size: u64,
}

pub const DEFAULT_MAX_BATCH_SIZE: u64 = 10_000_000_000;

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// `[transfer]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferSection {
    pub check: TransferCheck,
    pub min_age_secs: u64,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            check: TransferCheck::default(),
            min_age_secs: 30 * 60,
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub root_dir: Option<PathBuf>,
    pub pattern: Option<String>,
    pub models_dir: Option<PathBuf>,
    pub project_config: Option<PathBuf>,
    pub metadata_command: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            root_dir: None,
            pattern: None,
            models_dir: None,
            project_config: None,
            metadata_command: PathBuf::from(DEFAULT_METADATA_COMMAND),
        }
    }
}
