// src/config/models.rs

//! Basecalling and modification model selection.
//!
//! Model directories are named like `dna_r10.4.1_e8.2_400bps_hac@v4.3.0`;
//! modification models extend the base name, e.g.
//! `dna_r10.4.1_e8.2_400bps_hac@v4.3.0_5mCG_5hmCG@v1`.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::project::ProjectConfig;
use crate::config::run_config::RunConfig;
use crate::errors::{EldoradoError, Result};
use crate::fs::{file_name_str, list_dir_or_empty, FileSystem};
use crate::run::RunMetadata;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@v([\d.]*\d)$").expect("version regex is valid"));

/// Base modifications dorado can call alongside basecalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Mod5mCG5hmCG,
    Mod6mA,
}

impl Modification {
    /// Token used in model directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Modification::Mod5mCG5hmCG => "5mCG_5hmCG",
            Modification::Mod6mA => "6mA",
        }
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn version_components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|c| c.parse::<u64>().unwrap_or(0))
        .collect()
}

/// True if `candidate` is strictly newer than `current`.
///
/// Components are compared left to right as integers; the shorter version is
/// padded with zeros, so `1.0` and `1.0.0` are equal and neither is newer.
pub fn is_version_newer(current: &str, candidate: &str) -> bool {
    let mut cur = version_components(current);
    let mut cand = version_components(candidate);
    let len = cur.len().max(cand.len());
    cur.resize(len, 0);
    cand.resize(len, 0);

    for (a, b) in cur.iter().zip(cand.iter()) {
        match a.cmp(b) {
            Ordering::Greater => return false,
            Ordering::Less => return true,
            Ordering::Equal => {}
        }
    }
    false
}

/// Version suffix of a model name, e.g. `"4.3.0"` for `...hac@v4.3.0`.
pub fn extract_version(name: &str) -> Option<&str> {
    VERSION_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// The path with the newest `@v<version>` suffix.
///
/// On ties the first path seen wins. Paths without a version only win if no
/// versioned path precedes them.
pub fn get_latest_version(models: &[PathBuf]) -> Option<PathBuf> {
    let (first, rest) = models.split_first()?;
    let mut latest = first;
    let mut latest_version = file_name_str(first).and_then(extract_version);

    for path in rest {
        let Some(version) = file_name_str(path).and_then(extract_version) else {
            continue;
        };
        let newer = match latest_version {
            None => true,
            Some(current) => is_version_newer(current, version),
        };
        if newer {
            latest = path;
            latest_version = Some(version);
        }
    }

    Some(latest.clone())
}

/// Model name for a flow cell and sample rate.
pub fn lookup_basecalling_model(flow_cell_product_code: &str, sample_rate: u32) -> Option<&'static str> {
    match (flow_cell_product_code, sample_rate) {
        ("FLO-PRO114M", 4000) => Some("dna_r10.4.1_e8.2_400bps_hac@v4.1.0"),
        ("FLO-PRO114M", 5000) => Some("dna_r10.4.1_e8.2_400bps_hac@v4.3.0"),
        ("FLO-PRO002", _) => Some("dna_r9.4.1_e8_hac@v3.3"),
        _ => None,
    }
}

/// Basecalling model directory for a run, which must exist in `models_dir`.
pub fn get_basecalling_model(
    fs: &dyn FileSystem,
    metadata: &RunMetadata,
    models_dir: &Path,
) -> Result<PathBuf> {
    let name = lookup_basecalling_model(&metadata.flow_cell_product_code, metadata.sample_rate)
        .ok_or_else(|| {
            EldoradoError::ModelError(format!(
                "no basecalling model for flow cell {} at {} Hz",
                metadata.flow_cell_product_code, metadata.sample_rate
            ))
        })?;

    let model = models_dir.join(name);
    if !fs.exists(&model) {
        return Err(EldoradoError::ModelError(format!(
            "basecalling model {:?} does not exist",
            model
        )));
    }
    Ok(model)
}

/// Latest model per requested modification matching
/// `<basecalling_model_name>*<mod>*` in `models_dir`.
///
/// Modifications without any matching model are skipped.
pub fn get_modification_models(
    fs: &dyn FileSystem,
    models_dir: &Path,
    basecalling_model_name: &str,
    modifications: &[Modification],
) -> Result<Vec<PathBuf>> {
    let entries = list_dir_or_empty(fs, models_dir)?;
    let mut models = Vec::new();

    for modification in modifications {
        let candidates: Vec<PathBuf> = entries
            .iter()
            .filter(|p| {
                file_name_str(p)
                    .and_then(|name| name.strip_prefix(basecalling_model_name))
                    .map(|rest| rest.contains(modification.as_str()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        match get_latest_version(&candidates) {
            Some(model) => models.push(model),
            None => debug!(
                modification = %modification,
                base = basecalling_model_name,
                "no modification model found"
            ),
        }
    }

    Ok(models)
}

/// Resolve the dorado configuration for a run.
///
/// An explicit project model overrides the lookup table.
pub fn resolve_model_paths(
    fs: &dyn FileSystem,
    metadata: &RunMetadata,
    project: &ProjectConfig,
    models_dir: &Path,
) -> Result<RunConfig> {
    let basecalling_model = match &project.basecalling_model {
        Some(model) => model.clone(),
        None => get_basecalling_model(fs, metadata, models_dir)?,
    };

    let base_name = file_name_str(&basecalling_model).ok_or_else(|| {
        EldoradoError::ModelError(format!("invalid model path {:?}", basecalling_model))
    })?;
    // Modification models sit next to the base model.
    let mod_dir = basecalling_model.parent().unwrap_or(models_dir);
    let modification_models =
        get_modification_models(fs, mod_dir, base_name, &project.modifications())?;

    Ok(RunConfig {
        dorado_executable: project.dorado_executable.clone(),
        basecalling_model,
        modification_models,
    })
}
