// src/config/project.rs

//! Per-project settings from a CSV file.
//!
//! ```csv
//! project_id,account,dorado_executable,basecalling_model,mod_5mcg_5hmcg,mod_6ma
//! default,MyAccount,/opt/dorado/bin/dorado,auto,1,0
//! PRJ001,,,,,1
//! ```
//!
//! The `default` row fills blank cells of every other row and is used for
//! projects without a row of their own.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, error};

use crate::config::models::Modification;
use crate::errors::{EldoradoError, Result};
use crate::fs::{file_name_str, FileSystem};

pub const DEFAULT_PROJECT: &str = "default";
pub const AUTO_MODEL: &str = "auto";
pub const DORADO_BINARY_NAME: &str = "dorado";

const COLUMNS: [&str; 6] = [
    "project_id",
    "account",
    "dorado_executable",
    "basecalling_model",
    "mod_5mcg_5hmcg",
    "mod_6ma",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub project_id: String,
    /// Scheduler account; `None` uses the site default.
    pub account: Option<String>,
    pub dorado_executable: PathBuf,
    /// `None` selects the model from the flow cell lookup table.
    pub basecalling_model: Option<PathBuf>,
    pub mod_5mcg_5hmcg: bool,
    pub mod_6ma: bool,
}

impl ProjectConfig {
    pub fn modifications(&self) -> Vec<Modification> {
        let mut mods = Vec::new();
        if self.mod_5mcg_5hmcg {
            mods.push(Modification::Mod5mCG5hmCG);
        }
        if self.mod_6ma {
            mods.push(Modification::Mod6mA);
        }
        mods
    }
}

/// All valid project rows of a CSV file.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfigs {
    pub default: Option<ProjectConfig>,
    pub projects: Vec<ProjectConfig>,
}

impl ProjectConfigs {
    /// The row for `project_id`, falling back to the `default` row.
    pub fn for_project(&self, project_id: &str) -> Option<&ProjectConfig> {
        self.projects
            .iter()
            .find(|p| p.project_id == project_id)
            .or(self.default.as_ref())
    }
}

/// Raw cells of one CSV row, blanks as empty strings.
#[derive(Debug, Clone, Default)]
struct ProjectRow {
    cells: [String; 6],
}

impl ProjectRow {
    fn from_record(record: &StringRecord, indices: &[Option<usize>; 6]) -> Self {
        let mut cells: [String; 6] = Default::default();
        for (cell, idx) in cells.iter_mut().zip(indices.iter()) {
            if let Some(value) = idx.and_then(|i| record.get(i)) {
                *cell = value.to_string();
            }
        }
        Self { cells }
    }

    fn project_id(&self) -> &str {
        &self.cells[0]
    }

    fn fill_blanks_from(&mut self, default: &ProjectRow) {
        for (cell, fallback) in self.cells.iter_mut().zip(default.cells.iter()).skip(1) {
            if cell.is_empty() {
                *cell = fallback.clone();
            }
        }
    }
}

fn parse_bool(column: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        other => Err(EldoradoError::ConfigError(format!(
            "{column}: expected 1/0/true/false/yes/no, got '{other}'"
        ))),
    }
}

fn validate_row(fs: &dyn FileSystem, row: &ProjectRow) -> Result<ProjectConfig> {
    let [project_id, account, dorado, model, mod_5mcg, mod_6ma] = &row.cells;

    if project_id.is_empty() {
        return Err(EldoradoError::ConfigError("empty project_id".to_string()));
    }

    if dorado.is_empty() {
        return Err(EldoradoError::ConfigError("no dorado_executable".to_string()));
    }
    let dorado_executable = PathBuf::from(dorado);
    if !fs.is_file(&dorado_executable) || file_name_str(&dorado_executable) != Some(DORADO_BINARY_NAME) {
        return Err(EldoradoError::ConfigError(format!(
            "dorado_executable {:?} is not a dorado binary",
            dorado_executable
        )));
    }

    let basecalling_model = if model.is_empty() || model.eq_ignore_ascii_case(AUTO_MODEL) {
        None
    } else {
        let model = PathBuf::from(model);
        if !fs.is_dir(&model) {
            return Err(EldoradoError::ConfigError(format!(
                "basecalling_model {:?} is not a directory",
                model
            )));
        }
        Some(model)
    };

    Ok(ProjectConfig {
        project_id: project_id.clone(),
        account: (!account.is_empty()).then(|| account.clone()),
        dorado_executable,
        basecalling_model,
        mod_5mcg_5hmcg: parse_bool("mod_5mcg_5hmcg", mod_5mcg)?,
        mod_6ma: parse_bool("mod_6ma", mod_6ma)?,
    })
}

/// Parse project rows from CSV text.
///
/// Invalid rows are logged and dropped; only an unreadable file or a header
/// without `project_id` is an error.
pub fn parse_project_configs(fs: &dyn FileSystem, text: &str) -> Result<ProjectConfigs> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let mut indices: [Option<usize>; 6] = [None; 6];
    for (slot, column) in indices.iter_mut().zip(COLUMNS.iter()) {
        *slot = headers.iter().position(|h| h.eq_ignore_ascii_case(column));
    }
    if indices[0].is_none() {
        return Err(EldoradoError::ConfigError(
            "project config has no project_id column".to_string(),
        ));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(ProjectRow::from_record(&record, &indices));
    }

    let default_row = rows
        .iter()
        .find(|r| r.project_id() == DEFAULT_PROJECT)
        .cloned();

    let mut configs = ProjectConfigs::default();
    for mut row in rows {
        let is_default = row.project_id() == DEFAULT_PROJECT;
        if !is_default {
            if let Some(default) = &default_row {
                row.fill_blanks_from(default);
            }
        }

        match validate_row(fs, &row) {
            Ok(config) if is_default => configs.default = Some(config),
            Ok(config) => {
                debug!(project = %config.project_id, "loaded project config");
                configs.projects.push(config);
            }
            Err(err) => error!(project = row.project_id(), error = %err, "dropping invalid project config row"),
        }
    }

    Ok(configs)
}

/// Load project rows from a CSV file.
pub fn load_project_configs(fs: &dyn FileSystem, path: &Path) -> Result<ProjectConfigs> {
    let text = fs.read_to_string(path)?;
    parse_project_configs(fs, &text)
}
