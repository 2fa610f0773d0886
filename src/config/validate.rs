// src/config/validate.rs

use crate::config::model::{BatchSection, RawSiteConfig, SchedulerSection, SiteConfig};
use crate::errors::{EldoradoError, Result};

impl TryFrom<RawSiteConfig> for SiteConfig {
    type Error = EldoradoError;

    fn try_from(raw: RawSiteConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(SiteConfig::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawSiteConfig) -> Result<()> {
    validate_batch(&cfg.batch)?;
    validate_scheduler(&cfg.scheduler)?;
    if let Some(pattern) = &cfg.paths.pattern {
        if pattern.trim().is_empty() {
            return Err(EldoradoError::ConfigError(
                "[paths].pattern must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Shared with the CLI layer, which can override the sizes.
pub fn validate_batch(batch: &BatchSection) -> Result<()> {
    if batch.max_size == 0 {
        return Err(EldoradoError::ConfigError(
            "[batch].max_size must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(sched: &SchedulerSection) -> Result<()> {
    let required = [
        ("basecalling_walltime", &sched.basecalling_walltime),
        ("basecalling_mem", &sched.basecalling_mem),
        ("gpu_partition", &sched.gpu_partition),
        ("merging_walltime", &sched.merging_walltime),
        ("merging_mem", &sched.merging_mem),
        ("demux_walltime", &sched.demux_walltime),
        ("demux_mem", &sched.demux_mem),
        ("sbatch", &sched.sbatch),
        ("squeue", &sched.squeue),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(EldoradoError::ConfigError(format!(
                "[scheduler].{key} must not be empty"
            )));
        }
    }

    let cpus = [
        ("basecalling_cpus", sched.basecalling_cpus),
        ("merging_cpus", sched.merging_cpus),
        ("demux_cpus", sched.demux_cpus),
    ];
    for (key, value) in cpus {
        if value == 0 {
            return Err(EldoradoError::ConfigError(format!(
                "[scheduler].{key} must be >= 1 (got 0)"
            )));
        }
    }

    if let Some(account) = &sched.account {
        if account.trim().is_empty() {
            return Err(EldoradoError::ConfigError(
                "[scheduler].account must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}
