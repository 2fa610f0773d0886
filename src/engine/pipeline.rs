// src/engine/pipeline.rs

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info};

use crate::config::models::resolve_model_paths;
use crate::config::{ProjectConfig, ProjectConfigs, RunConfig, Settings};
use crate::errors::{EldoradoError, Result};
use crate::exec::JobScheduler;
use crate::fs::FileSystem;
use crate::gates::next_stage;
use crate::recovery::reconcile;
use crate::run::{find_runs, MetadataReader, RunDescriptor, RunMetadata};
use crate::stages::basecalling::process_basecalling;
use crate::stages::cleanup::process_cleanup;
use crate::stages::demultiplexing::process_demultiplexing;
use crate::stages::merging::process_merging;
use crate::stages::StageContext;
use crate::types::Stage;

use super::{PassReport, RunOutcome};

/// Drives runs through their stages using a scheduler `S` and a metadata
/// source `M`.
pub struct Pipeline<S: JobScheduler, M: MetadataReader> {
    fs: Arc<dyn FileSystem>,
    scheduler: S,
    metadata: M,
    settings: Settings,
    projects: ProjectConfigs,
}

impl<S: JobScheduler, M: MetadataReader> fmt::Debug for Pipeline<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("projects", &self.projects)
            .finish_non_exhaustive()
    }
}

impl<S: JobScheduler, M: MetadataReader> Pipeline<S, M> {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        scheduler: S,
        metadata: M,
        settings: Settings,
        projects: ProjectConfigs,
    ) -> Self {
        Self {
            fs,
            scheduler,
            metadata,
            settings,
            projects,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Discover runs under the configured root and process them.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let runs = find_runs(self.fs.as_ref(), &self.settings.root_dir, &self.settings.pattern)?;
        info!(
            root = ?self.settings.root_dir,
            pattern = %self.settings.pattern,
            runs = runs.len(),
            "discovered runs"
        );
        Ok(self.process_runs(&runs, SystemTime::now()).await)
    }

    /// Process `runs` as one pass anchored at `now`.
    ///
    /// An error in one run is logged and recorded; the remaining runs are
    /// still processed.
    pub async fn process_runs(&self, runs: &[RunDescriptor], now: SystemTime) -> PassReport {
        let ctx = StageContext {
            fs: self.fs.as_ref(),
            scheduler: &self.scheduler,
            settings: &self.settings,
            policy: self.settings.transfer_policy().at(now),
            created_at: now
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };

        let mut report = PassReport::default();
        for run in runs {
            match self.process_run(&ctx, run).await {
                Ok(outcome) => {
                    debug!(run = ?run.input_dir(), outcome = %outcome, "run processed");
                    report.outcomes.push((run.input_dir().to_path_buf(), outcome));
                }
                Err(err) => {
                    error!(run = ?run.input_dir(), error = %err, "run failed; skipping until next pass");
                    report
                        .failures
                        .push((run.input_dir().to_path_buf(), err.to_string()));
                }
            }
        }
        report
    }

    async fn process_run(&self, ctx: &StageContext<'_>, run: &RunDescriptor) -> Result<RunOutcome> {
        reconcile(ctx.fs, ctx.scheduler, run, ctx.dry_run()).await?;

        let mut metadata = None;
        if !ctx.fs.exists(&run.config_file()) {
            let md = self.read_metadata(run).await?;
            let config = self.resolve_run_config(&md)?;
            if ctx.dry_run() {
                info!(
                    run = ?run.input_dir(),
                    config = ?config,
                    "dry run: would write run config"
                );
                return Ok(RunOutcome::ConfigPending);
            }
            config.save(ctx.fs, &run.config_file())?;
            info!(run = ?run.input_dir(), path = ?run.config_file(), "wrote run config");
            metadata = Some(md);
        }

        let Some(stage) = next_stage(ctx.fs, run, &ctx.policy) else {
            return Ok(RunOutcome::Idle);
        };
        info!(run = ?run.input_dir(), stage = %stage, "stage pending");

        match stage {
            Stage::Basecalling => {
                let metadata = self.cached_metadata(metadata, run).await?;
                let account = self.account_for(&metadata)?;
                let batches = process_basecalling(ctx, run, account).await?;
                Ok(RunOutcome::Basecalling { batches })
            }
            Stage::Merging => {
                let metadata = self.cached_metadata(metadata, run).await?;
                process_merging(ctx, run, self.account_for(&metadata)?).await?;
                Ok(RunOutcome::Merging)
            }
            Stage::Demultiplexing => {
                let metadata = self.cached_metadata(metadata, run).await?;
                let account = self.account_for(&metadata)?;
                let action = process_demultiplexing(ctx, run, &metadata, account).await?;
                Ok(RunOutcome::Demultiplexing(action))
            }
            Stage::Cleanup => {
                process_cleanup(ctx, run)?;
                Ok(RunOutcome::Cleanup)
            }
        }
    }

    async fn cached_metadata(
        &self,
        cached: Option<RunMetadata>,
        run: &RunDescriptor,
    ) -> Result<RunMetadata> {
        match cached {
            Some(metadata) => Ok(metadata),
            None => self.read_metadata(run).await,
        }
    }

    async fn read_metadata(&self, run: &RunDescriptor) -> Result<RunMetadata> {
        self.metadata
            .read_run_metadata(self.fs.as_ref(), run.input_dir())
            .await
    }

    fn project_for(&self, metadata: &RunMetadata) -> Result<&ProjectConfig> {
        self.projects.for_project(&metadata.project_id).ok_or_else(|| {
            EldoradoError::ConfigError(format!(
                "no project config for '{}' and no default row",
                metadata.project_id
            ))
        })
    }

    fn account_for(&self, metadata: &RunMetadata) -> Result<Option<&str>> {
        let project = self.project_for(metadata)?;
        Ok(project
            .account
            .as_deref()
            .or(self.settings.scheduler.account.as_deref()))
    }

    fn resolve_run_config(&self, metadata: &RunMetadata) -> Result<RunConfig> {
        let project = self.project_for(metadata)?;
        resolve_model_paths(self.fs.as_ref(), metadata, project, &self.settings.models_dir)
    }
}
