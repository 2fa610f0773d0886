// src/config/settings.rs

//! Effective settings for one invocation: CLI flags layered over the site
//! config.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::CliArgs;
use crate::config::model::{BatchSection, SchedulerSection, SiteConfig};
use crate::config::validate::validate_batch;
use crate::errors::{EldoradoError, Result};
use crate::run::TransferPolicy;
use crate::types::TransferCheck;

/// Size limits for new batches, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub min_size: u64,
    pub max_size: u64,
}

impl From<&BatchSection> for BatchLimits {
    fn from(section: &BatchSection) -> Self {
        Self {
            min_size: section.min_size,
            max_size: section.max_size,
        }
    }
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::from(&BatchSection::default())
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub root_dir: PathBuf,
    pub pattern: String,
    pub project_config: PathBuf,
    pub models_dir: PathBuf,
    pub metadata_command: PathBuf,
    pub mail_users: Vec<String>,
    pub batch: BatchLimits,
    pub transfer_check: TransferCheck,
    pub min_age: Duration,
    pub scheduler: SchedulerSection,
    pub dry_run: bool,
}

impl Settings {
    /// Merge CLI flags over the site config.
    ///
    /// Fails if a required path is given in neither.
    pub fn resolve(args: &CliArgs, site: SiteConfig) -> Result<Self> {
        fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
            value.ok_or_else(|| {
                EldoradoError::ConfigError(format!(
                    "--{flag} is required (or set it in the site config [paths])"
                ))
            })
        }

        let paths = site.paths;
        let batch = BatchSection {
            min_size: args.min_batch_size.unwrap_or(site.batch.min_size),
            max_size: args.max_batch_size.unwrap_or(site.batch.max_size),
        };
        validate_batch(&batch)?;

        Ok(Self {
            root_dir: required(args.root_dir.clone().or(paths.root_dir), "root-dir")?,
            pattern: required(args.pattern.clone().or(paths.pattern), "pattern")?,
            project_config: required(
                args.project_config.clone().or(paths.project_config),
                "project-config",
            )?,
            models_dir: required(args.models_dir.clone().or(paths.models_dir), "models-dir")?,
            metadata_command: paths.metadata_command,
            mail_users: args.mail_users.clone(),
            batch: BatchLimits::from(&batch),
            transfer_check: args.transfer_check.unwrap_or(site.transfer.check),
            min_age: Duration::from_secs(args.min_age_secs.unwrap_or(site.transfer.min_age_secs)),
            scheduler: site.scheduler,
            dry_run: args.dry_run,
        })
    }

    /// Transfer policy anchored at the current time.
    pub fn transfer_policy(&self) -> TransferPolicy {
        TransferPolicy::new(self.transfer_check, self.min_age)
    }
}
