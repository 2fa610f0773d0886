// src/lib.rs

pub mod batch;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod gates;
pub mod logging;
pub mod recovery;
pub mod run;
pub mod stages;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::{load_project_configs, Settings, SiteConfig};
use crate::engine::Pipeline;
use crate::exec::SlurmScheduler;
use crate::fs::{FileSystem, RealFileSystem};
use crate::run::CommandMetadataReader;

/// High-level entry point used by `main.rs`.
///
/// One invocation is one pass:
/// - load the site config (if any) and layer CLI flags over it
/// - load the per-project CSV
/// - discover runs and drive each one stage forward
///
/// Per-run failures are logged and do not fail the pass.
pub async fn run(args: CliArgs) -> Result<()> {
    let site = match &args.config {
        Some(path) => load_and_validate(path)?,
        None => SiteConfig::default(),
    };
    let settings = Settings::resolve(&args, site)?;
    debug!(?settings, "resolved settings");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let projects = load_project_configs(fs.as_ref(), &settings.project_config)?;
    if projects.default.is_none() && projects.projects.is_empty() {
        warn!(path = ?settings.project_config, "project config has no valid rows");
    }

    let scheduler = SlurmScheduler::from_config(&settings.scheduler);
    let metadata = CommandMetadataReader::new(&settings.metadata_command);

    if settings.dry_run {
        info!("dry run: no markers will be written and no jobs submitted");
    }

    let pipeline = Pipeline::new(fs, scheduler, metadata, settings, projects);
    let report = pipeline.run_pass().await?;

    info!(
        processed = report.outcomes.len(),
        failed = report.failures.len(),
        "pass complete"
    );
    Ok(())
}
