// src/config/mod.rs

//! Configuration for eldorado.
//!
//! Responsibilities:
//! - Site-wide TOML settings (`model.rs`, `loader.rs`, `validate.rs`).
//! - CLI flags layered over the site config (`settings.rs`).
//! - Per-project CSV rows (`project.rs`).
//! - Model selection and the per-run JSON config (`models.rs`, `run_config.rs`).

pub mod loader;
pub mod model;
pub mod models;
pub mod project;
pub mod run_config;
pub mod settings;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{RawSiteConfig, SiteConfig};
pub use project::{load_project_configs, ProjectConfig, ProjectConfigs};
pub use run_config::RunConfig;
pub use settings::{BatchLimits, Settings};
