// src/fs/mod.rs

//! Filesystem access used by every stage of the pipeline.
//!
//! The marker-file protocol is the only shared state between invocations, so
//! all reads and writes of run directories go through [`FileSystem`]. Tests
//! swap in [`mock::MockFileSystem`] to control file contents and modification
//! times without touching disk.

use std::fmt::Debug;
use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Read at most `len` bytes from the start of a file.
    fn read_head(&self, path: &Path, len: usize) -> Result<Vec<u8>>;

    /// Read at most `len` bytes from the end of a file.
    fn read_tail(&self, path: &Path, len: usize) -> Result<Vec<u8>>;

    /// Write a file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Create an empty file only if it does not exist yet (`O_CREAT|O_EXCL`).
    ///
    /// Returns `Ok(false)` when the file already exists. Parent directories
    /// are created as needed.
    fn create_new(&self, path: &Path) -> Result<bool>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Size of a file in bytes.
    fn size(&self, path: &Path) -> Result<u64>;

    /// Last modification time of a file.
    fn modified(&self, path: &Path) -> Result<SystemTime>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn read_head(&self, path: &Path, len: usize) -> Result<Vec<u8>> {
        let file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut buf)
            .with_context(|| format!("reading head of {:?}", path))?;
        Ok(buf)
    }

    fn read_tail(&self, path: &Path, len: usize) -> Result<Vec<u8>> {
        let mut file =
            fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        let size = file.metadata()?.len();
        let start = size.saturating_sub(len as u64);
        file.seek(SeekFrom::Start(start))
            .with_context(|| format!("seeking in {:?}", path))?;
        let mut buf = Vec::with_capacity(len);
        file.read_to_end(&mut buf)
            .with_context(|| format!("reading tail of {:?}", path))?;
        Ok(buf)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        let mut file = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        file.write_all(contents).with_context(|| format!("writing to file {:?}", path))?;
        Ok(())
    }

    fn create_new(&self, path: &Path) -> Result<bool> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        match fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e).with_context(|| format!("creating marker {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("removing file {:?}", path))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).with_context(|| format!("removing dir {:?}", path))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        fs::rename(from, to).with_context(|| format!("renaming {:?} to {:?}", from, to))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn size(&self, path: &Path) -> Result<u64> {
        let meta = fs::metadata(path).with_context(|| format!("stat {:?}", path))?;
        Ok(meta.len())
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        let meta = fs::metadata(path).with_context(|| format!("stat {:?}", path))?;
        meta.modified()
            .with_context(|| format!("reading modification time of {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }
}

/// List the entries of `dir`, treating a missing directory as empty.
///
/// Marker directories only appear once the first marker is written, so
/// "not there yet" is the normal state for a fresh run.
pub fn list_dir_or_empty(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<PathBuf>> {
    if !fs.is_dir(dir) {
        return Ok(Vec::new());
    }
    fs.read_dir(dir)
}

/// File name of `path` as UTF-8, if it has one.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
