// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EldoradoError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("No complete pod5 files found in {0:?}")]
    MetadataNotFound(PathBuf),

    #[error("Metadata error: {0}")]
    MetadataError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Sample sheet error: {0}")]
    SampleSheetError(String),

    #[error("No batch outputs to merge in {0:?}")]
    NothingToMerge(PathBuf),

    #[error("Lock already held: {0:?}")]
    LockConflict(PathBuf),

    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EldoradoError>;
