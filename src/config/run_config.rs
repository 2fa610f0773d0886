// src/config/run_config.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::fs::FileSystem;

/// Tools and models used for every batch of a run, persisted as
/// `dorado_config.json` the first time the run is seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub dorado_executable: PathBuf,
    pub basecalling_model: PathBuf,
    #[serde(default)]
    pub modification_models: Vec<PathBuf>,
}

impl RunConfig {
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let text = fs.read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        fs.write(path, &json)?;
        Ok(())
    }

    /// Comma-separated modification models, empty if there are none.
    pub fn modification_models_arg(&self) -> String {
        self.modification_models
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
