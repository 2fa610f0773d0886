// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawSiteConfig, SiteConfig};
use crate::errors::Result;

/// Load a site configuration file and return the raw `RawSiteConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSiteConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawSiteConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a site configuration file and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks sizes, walltimes and resource requests for sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SiteConfig> {
    let raw_config = load_from_path(&path)?;
    let config = SiteConfig::try_from(raw_config)?;
    Ok(config)
}
