// Engine Collaborators - Wall clock and persistence consumed by the engine

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The host's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stuck at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Writes text somewhere the user chose
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Persist `text`, proposing `suggested_name`.
    /// Ok(None) means the user declined to save.
    async fn save(&self, suggested_name: &str, text: &str) -> io::Result<Option<PathBuf>>;
}

/// Saves every file under one directory with its suggested name
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl PersistenceSink for FileSink {
    async fn save(&self, suggested_name: &str, text: &str) -> io::Result<Option<PathBuf>> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(suggested_name);
        tokio::fs::write(&path, text).await?;
        debug!(path = %path.display(), bytes = text.len(), "file saved");
        Ok(Some(path))
    }
}

/// A sink whose user always cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineSink;

#[async_trait]
impl PersistenceSink for DeclineSink {
    async fn save(&self, _suggested_name: &str, _text: &str) -> io::Result<Option<PathBuf>> {
        Ok(None)
    }
}
