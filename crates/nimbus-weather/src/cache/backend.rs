//! Persistence backends for the cache file.
//!
//! Backends never fail a load: a missing, unreadable or malformed store reads as `None`
//! and the caller starts over with an empty one.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::types::CacheFile;

pub trait CacheBackend: Send + Sync {
    /// Read the whole store. `None` when absent or unusable.
    fn load(&self) -> Option<CacheFile>;

    /// Replace the whole store.
    fn save(&self, file: &CacheFile) -> io::Result<()>;

    /// Remove all persisted state.
    fn clear(&self) -> io::Result<()>;
}

/// JSON file replaced atomically through a sibling `.tmp` file.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl CacheBackend for FileBackend {
    fn load(&self) -> Option<CacheFile> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!("Cache file unreadable at {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::debug!("Cache file malformed at {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn save(&self, file: &CacheFile) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec(file)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)
    }

    fn clear(&self) -> io::Result<()> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// In-memory backend. Stores the serialized form so tests exercise the same encoding.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw contents, e.g. to simulate a corrupted file.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.contents.lock().clone()
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self) -> Option<CacheFile> {
        let contents = self.contents.lock();
        contents
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    fn save(&self, file: &CacheFile) -> io::Result<()> {
        let json = serde_json::to_string(file)?;
        *self.contents.lock() = Some(json);
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.contents.lock() = None;
        Ok(())
    }
}
