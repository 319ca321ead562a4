//! File-backed document store.
//!
//! All collections live in one JSON file. Each committed batch is written to
//! a temporary file in the same directory and then renamed over the snapshot,
//! so readers see either the old or the new state and never a partial batch.
//!
//! Several processes may share one store file. Commits hold an exclusive
//! advisory lock on a `<store>.lock` sidecar from load to rename, so every
//! batch and its preconditions are checked against the latest committed state.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use super::{
    CreatedDocument, Document, DocumentStore, Query, Result, Snapshot, StoreError, WriteOp,
    WriteResult,
};

const NOTIFY_CAPACITY: usize = 256;

/// Document store persisted as a single JSON snapshot
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,

    /// Keeps this process's writers from queueing on the file lock
    write_lock: Mutex<()>,

    created_tx: broadcast::Sender<CreatedDocument>,
}

impl FileStore {
    /// Open a store at `path`; the file is created on first commit
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (created_tx, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            lock_path: sidecar_lock_path(&path),
            path,
            write_lock: Mutex::new(()),
            created_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current snapshot (empty if the file does not exist yet)
    pub async fn load(&self) -> Result<Snapshot> {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        blocking(move || {
            if !path.exists() {
                return Ok(Snapshot::new());
            }

            let lock = open_lock_file(&lock_path)?;
            FileExt::lock_shared(&lock)?;

            // Lock is released when the file is dropped
            read_snapshot(&path)
        })
        .await
    }
}

/// `store.json` -> `store.json.lock`
fn sidecar_lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File> {
    std::fs::create_dir_all(parent_dir(lock_path))?;
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(file)
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        return Ok(Snapshot::new());
    }

    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Snapshot::new());
    }

    Ok(serde_json::from_str(&content)?)
}

/// Write to a temp file next to `path`, then rename it into place
fn replace_file(path: &Path, data: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.flush()?;
    temp_file.persist(path).map_err(|e| StoreError::Io(e.error))?;

    Ok(())
}

/// Load, apply and persist one batch under the exclusive file lock
fn commit_batch(
    path: &Path,
    lock_path: &Path,
    ops: Vec<WriteOp>,
) -> Result<(WriteResult, Vec<CreatedDocument>)> {
    let lock = open_lock_file(lock_path)?;
    FileExt::lock_exclusive(&lock)?;

    let mut snapshot = read_snapshot(path)?;
    let (result, created) = snapshot.apply(ops)?;

    if result.is_committed() {
        replace_file(path, &serde_json::to_vec_pretty(&snapshot)?)?;
        debug!(path = %path.display(), "Snapshot persisted");
    }

    Ok((result, created))
}

/// Run file IO off the async worker threads
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Store task failed: {}", e)))?
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.load().await?.get(collection, id))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        Ok(self.load().await?.query(query))
    }

    async fn atomic_write(&self, ops: Vec<WriteOp>) -> Result<WriteResult> {
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        let (result, created) = blocking(move || commit_batch(&path, &lock_path, ops)).await?;

        for doc in created {
            // No subscribers is fine
            let _ = self.created_tx.send(doc);
        }

        Ok(result)
    }

    fn subscribe(&self) -> broadcast::Receiver<CreatedDocument> {
        self.created_tx.subscribe()
    }
}
