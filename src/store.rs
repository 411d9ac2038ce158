use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::util::ensure_directory;

/// Blob storage addressed by key. Keys may contain `/` separators; the
/// filesystem implementation maps them to nested directories under a bucket
/// root.
pub trait ObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Box<dyn Read>>;
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write object: {}", path.display()))
    }

    fn get(&self, key: &str) -> Result<Box<dyn Read>> {
        let path = self.root.join(key);
        let file = File::open(&path)
            .with_context(|| format!("failed to open object: {}", path.display()))?;
        Ok(Box::new(file))
    }
}

/// Single-slot high-water-mark store backed by one text file. The producer
/// reads it once per run; advancing it is the caller's decision after the
/// downstream load succeeds.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn get(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read watermark: {}", self.path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    pub fn set(&self, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_directory(parent)?;
        }
        fs::write(&self.path, format!("{value}\n"))
            .with_context(|| format!("failed to write watermark: {}", self.path.display()))
    }
}
