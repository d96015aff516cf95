//! Key-value storage used to persist page caches.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::fs;
use tokio::io::AsyncWriteExt;

const DEFAULT_MAX_FILE_BYTES: usize = 4 * 1024 * 1024;
static STORE_WRITE_NONCE: AtomicUsize = AtomicUsize::new(0);

/// Last-write-wins string store.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

/// In-process store. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store, one file per key.
///
/// Paths are deterministic by key: `<root>/<key-hex>.json`. Writes go to a
/// temporary file renamed into place. Values larger than `max_file_bytes`
/// are refused on write and treated as absent on read.
#[derive(Clone, Debug)]
pub struct FileKeyValueStore {
    root: PathBuf,
    max_file_bytes: usize,
}

impl FileKeyValueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Set the maximum value size in bytes. `0` is treated as `1`.
    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// File holding the value of `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key_hex(key)))
    }
}

impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        let path = self.path_for(key);
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        if metadata.len() > self.max_file_bytes as u64 {
            log::warn!(
                "ignoring {} ({} bytes exceeds max_file_bytes {})",
                path.display(),
                metadata.len(),
                self.max_file_bytes
            );
            return Ok(None);
        }
        fs::read_to_string(&path).await.map(Some)
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        if value.len() > self.max_file_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "value exceeds max_file_bytes",
            ));
        }
        fs::create_dir_all(&self.root).await?;
        let final_path = self.path_for(key);
        let nonce = STORE_WRITE_NONCE.fetch_add(1, Ordering::Relaxed);
        let temp_path = self.root.join(format!(
            "{}.json.tmp-{}-{}",
            key_hex(key),
            std::process::id(),
            nonce
        ));
        if let Err(err) = write_new(&temp_path, value.as_bytes()).await {
            remove_file_quiet(&temp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(&temp_path, &final_path).await {
            remove_file_quiet(&temp_path).await;
            return Err(err);
        }
        Ok(())
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

async fn remove_file_quiet(path: &Path) {
    let _ = fs::remove_file(path).await;
}

fn key_hex(key: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(key.len() * 2);
    for byte in key.bytes() {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
