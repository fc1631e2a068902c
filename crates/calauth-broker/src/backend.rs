//! Key/value persistence backends for the token store.
//!
//! The broker assumes the host brings some durable key/value store (plugin
//! settings storage, localStorage, a config file). [`TokenBackend`] is the
//! seam; two implementations ship with the crate: an in-memory map for tests
//! and a JSON file written atomically with restrictive permissions.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{BrokerError, BrokerResult};

/// Durable string key/value storage.
///
/// Values are opaque to the backend; encryption happens above it in the
/// token store. Writes overwrite; reading a never-written key yields `None`.
pub trait TokenBackend: Send + Sync {
    /// Reads the raw stored value for a key.
    fn get(&self, key: &str) -> BrokerResult<Option<String>>;

    /// Writes the raw value for a key.
    fn set(&self, key: &str, value: &str) -> BrokerResult<()>;
}

/// In-memory backend. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenBackend for MemoryBackend {
    fn get(&self, key: &str) -> BrokerResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BrokerResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file backend.
///
/// The whole map is rewritten on every set: write to a temp file, then rename
/// for atomicity. On Unix the file is chmod 0600 since it may hold raw
/// bearer tokens when encryption is disabled.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileBackend {
    /// Opens (or creates) a file backend at the given path.
    ///
    /// A missing file is an empty store; a present but unparsable file is an
    /// error rather than silent data loss.
    pub fn open(path: impl Into<PathBuf>) -> BrokerResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| BrokerError::storage(format!("failed to read token file: {e}")))?;
            serde_json::from_str(&content)
                .map_err(|e| BrokerError::storage(format!("failed to parse token file: {e}")))?
        } else {
            debug!("no token file at {:?}, starting empty", path);
            HashMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &HashMap<String, String>) -> BrokerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BrokerError::storage(format!("failed to create token dir: {e}")))?;
        }

        let content = serde_json::to_string_pretty(values)
            .map_err(|e| BrokerError::storage(format!("failed to serialize tokens: {e}")))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .map_err(|e| BrokerError::storage(format!("failed to write token file: {e}")))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| BrokerError::storage(format!("failed to rename token file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        debug!("saved tokens to {:?}", self.path);
        Ok(())
    }
}

impl TokenBackend for FileBackend {
    fn get(&self, key: &str) -> BrokerResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> BrokerResult<()> {
        let mut values = self.values.lock().unwrap();
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("k").unwrap(), None);
        backend.set("k", "v").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some("v".to_string()));
        backend.set("k", "w").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some("w".to_string()));
    }

    #[test]
    fn file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let backend = FileBackend::open(&path).unwrap();
        backend.set("access", "token-a").unwrap();
        backend.set("refresh", "token-r").unwrap();

        let reopened = FileBackend::open(&path).unwrap();
        assert_eq!(reopened.get("access").unwrap(), Some("token-a".to_string()));
        assert_eq!(reopened.get("refresh").unwrap(), Some("token-r".to_string()));
    }

    #[test]
    fn file_backend_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(backend.get("anything").unwrap(), None);
    }

    #[test]
    fn file_backend_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "not json").unwrap();
        assert!(FileBackend::open(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn file_backend_sets_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let backend = FileBackend::open(&path).unwrap();
        backend.set("k", "v").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
