// src/batch/manifest.rs

//! Batch manifest: member paths, one per line, newline-terminated.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::fs::FileSystem;

pub fn render_manifest(files: &[PathBuf]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str(&file.to_string_lossy());
        out.push('\n');
    }
    out
}

pub fn parse_manifest(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub fn write_manifest(fs: &dyn FileSystem, path: &Path, files: &[PathBuf]) -> Result<()> {
    fs.write(path, render_manifest(files).as_bytes())
}

pub fn read_manifest(fs: &dyn FileSystem, path: &Path) -> Result<Vec<PathBuf>> {
    Ok(parse_manifest(&fs.read_to_string(path)?))
}
