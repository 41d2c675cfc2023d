//! Local durable cache for the CRS profile.
//!
//! Only the [`CrsProfile`] subtree is cached. It is written on every change and
//! read once when the store is opened, so calculator inputs survive a restart
//! even when nobody is signed in.
//!
//! [`FileCache`] keeps one JSON file per namespace:
//!
//! ```json
//! { "_v": 1, "state": { "age": 31, "education": "masters", ... } }
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Deserializer, Serialize};

use super::errors::CacheError;
use crate::{Result, model::CrsProfile};

/// The current cache file format version.
const CACHE_VERSION: u8 = 1;

/// Validates the cache version during deserialization.
fn validate_cache_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != CACHE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported cache version {version}; only version {CACHE_VERSION} is supported"
        )));
    }
    Ok(version)
}

#[derive(Serialize, Deserialize)]
struct CachedBlob {
    #[serde(rename = "_v", deserialize_with = "validate_cache_version")]
    version: u8,
    state: CrsProfile,
}

/// Storage for the cached CRS profile.
pub trait LocalCache: Send + Sync {
    /// Read the cached profile, `None` when nothing has been cached yet.
    fn load(&self) -> Result<Option<CrsProfile>>;

    /// Replace the cached profile.
    fn save(&self, profile: &CrsProfile) -> Result<()>;

    /// Remove the cached profile.
    fn clear(&self) -> Result<()>;
}

/// File-backed cache, one JSON file per namespace.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    namespace: String,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.into(),
        }
    }

    /// Path of the file backing this namespace.
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::FileIo {
            namespace: self.namespace.clone(),
            source,
        }
    }
}

impl LocalCache for FileCache {
    fn load(&self) -> Result<Option<CrsProfile>> {
        let json = match fs::read_to_string(self.path()) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e).into()),
        };
        let blob: CachedBlob =
            serde_json::from_str(&json).map_err(|source| CacheError::DeserializationFailed {
                namespace: self.namespace.clone(),
                source,
            })?;
        Ok(Some(blob.state))
    }

    fn save(&self, profile: &CrsProfile) -> Result<()> {
        let blob = CachedBlob {
            version: CACHE_VERSION,
            state: profile.clone(),
        };
        let json = serde_json::to_string_pretty(&blob).map_err(|source| {
            CacheError::SerializationFailed {
                namespace: self.namespace.clone(),
                source,
            }
        })?;

        fs::create_dir_all(&self.dir).map_err(|e| self.io_error(e))?;
        // Write-then-rename so a crash never leaves a half-written blob behind.
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e).into()),
        }
    }
}

/// In-process cache, for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<CrsProfile>>,
    saves: Mutex<usize>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that already holds `profile`.
    pub fn with_profile(profile: CrsProfile) -> Self {
        Self {
            slot: Mutex::new(Some(profile)),
            saves: Mutex::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalCache for MemoryCache {
    fn load(&self) -> Result<Option<CrsProfile>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, profile: &CrsProfile) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(profile.clone());
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Helper for callers that only have a directory: the default-namespace cache in `dir`.
pub fn default_file_cache(dir: impl AsRef<Path>) -> FileCache {
    FileCache::new(dir.as_ref(), crate::constants::CRS_CACHE_NAMESPACE)
}
