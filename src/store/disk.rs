//! File-per-key byte store.
//!
//! Each key is written to `<root>/<hex(key)>`. Writes go to a temporary file
//! first and are renamed into place, so readers never see a partial value;
//! concurrent writers of one key race and the last rename wins. All file
//! system work runs on tokio's blocking pool.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;

use crate::error::StoreError;

use super::{ByteStore, StoreUsage};

const TEMP_PREFIX: &str = ".tmp-";

/// Default number of concurrent file operations
const DEFAULT_MAX_CONCURRENT_IO: usize = 64;

pub struct DiskStore {
    root: PathBuf,
    io_limiter: Arc<Semaphore>,
    temp_counter: AtomicU64,
}

impl DiskStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_concurrency(root, DEFAULT_MAX_CONCURRENT_IO)
    }

    pub fn with_concurrency(
        root: impl Into<PathBuf>,
        max_concurrent_io: usize,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| io_error(&root.display().to_string(), e))?;
        Ok(Self {
            root,
            io_limiter: Arc::new(Semaphore::new(max_concurrent_io.max(1))),
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hex::encode(key.as_bytes()))
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        let _permit = self
            .io_limiter
            .acquire()
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?;
        tokio::task::spawn_blocking(op)
            .await
            .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

fn io_error(key: &str, err: io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ByteStore for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(key);
        let key = key.to_string();
        self.run_blocking(move || match std::fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&key, e)),
        })
        .await
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let serial = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = self.root.join(format!(
            "{}{}-{}",
            TEMP_PREFIX,
            serial,
            hex::encode(key.as_bytes())
        ));
        let key = key.to_string();
        self.run_blocking(move || {
            std::fs::write(&temp, &value).map_err(|e| io_error(&key, e))?;
            std::fs::rename(&temp, &path).map_err(|e| {
                let _ = std::fs::remove_file(&temp);
                io_error(&key, e)
            })
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let key = key.to_string();
        self.run_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&key, e)),
        })
        .await
    }

    async fn usage(&self) -> Result<StoreUsage, StoreError> {
        let root = self.root.clone();
        self.run_blocking(move || {
            let label = root.display().to_string();
            let mut usage = StoreUsage::default();
            for entry in std::fs::read_dir(&root).map_err(|e| io_error(&label, e))? {
                let entry = entry.map_err(|e| io_error(&label, e))?;
                if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    continue;
                }
                let meta = entry.metadata().map_err(|e| io_error(&label, e))?;
                if meta.is_file() {
                    usage.entries += 1;
                    usage.bytes += meta.len() as usize;
                }
            }
            Ok(usage)
        })
        .await
    }

    fn name(&self) -> &str {
        "disk"
    }
}
