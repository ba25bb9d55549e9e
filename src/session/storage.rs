use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::error::{ClientError, ClientResult};

pub const ACCESS_TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Durable key-value store holding session credentials.
///
/// Only `SessionStore` writes through this trait; the HTTP client reads the
/// access token from it.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> ClientResult<()>;
    fn remove(&self, key: &str) -> ClientResult<()>;
}

/// Process-local storage, mostly useful for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn get(&self, key: &str) -> Option<String> {
        let guard = self.entries.lock().ok()?;
        guard.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| ClientError::storage("memory storage lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| ClientError::storage("memory storage lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }
}

/// JSON map persisted on disk with owner-only permissions.
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> ClientResult<HashMap<String, String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => {
                return Err(ClientError::storage(format!(
                    "read {}: {err}",
                    self.path.display()
                )));
            }
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|err| ClientError::storage(format!("parse {}: {err}", self.path.display())))
    }

    fn write_map(&self, map: &HashMap<String, String>) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    ClientError::storage(format!("mkdir {}: {err}", parent.display()))
                })?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Err(err) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                    {
                        tracing::warn!("failed to chmod 0700 {}: {err}", parent.display());
                    }
                }
            }
        }

        let body = serde_json::to_string_pretty(map)
            .map_err(|err| ClientError::storage(format!("encode credentials: {err}")))?;
        fs::write(&self.path, body)
            .map_err(|err| ClientError::storage(format!("write {}: {err}", self.path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(|err| {
                ClientError::storage(format!("chmod {}: {err}", self.path.display()))
            })?;
        }

        Ok(())
    }
}

impl FileTokenStorage {
    /// Current entries, or an empty map when the file cannot be parsed. The
    /// next write replaces an unreadable file.
    fn read_map_for_update(&self) -> HashMap<String, String> {
        self.read_map().unwrap_or_else(|err| {
            tracing::warn!(
                %err,
                path = %self.path.display(),
                "discarding unreadable credentials file"
            );
            HashMap::new()
        })
    }
}

impl TokenStorage for FileTokenStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        match self.read_map() {
            Ok(map) => map.get(key).filter(|v| !v.is_empty()).cloned(),
            Err(err) => {
                tracing::warn!(%err, "credentials file unreadable");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ClientError::storage("credentials lock poisoned"))?;
        let mut map = self.read_map_for_update();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| ClientError::storage("credentials lock poisoned"))?;
        let mut map = self.read_map_for_update();
        if map.remove(key).is_none() && !self.path.exists() {
            return Ok(());
        }
        self.write_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_set_get_remove() {
        let storage = MemoryTokenStorage::new();
        assert!(storage.get(ACCESS_TOKEN_KEY).is_none());

        storage.set(ACCESS_TOKEN_KEY, "abc").expect("set");
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).as_deref(), Some("abc"));

        storage.remove(ACCESS_TOKEN_KEY).expect("remove");
        assert!(storage.get(ACCESS_TOKEN_KEY).is_none());
    }

    #[test]
    fn file_storage_persists_across_instances() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let path = tmp.path().join("nested").join("credentials.json");

        let storage = FileTokenStorage::new(&path);
        storage.set(ACCESS_TOKEN_KEY, "access-1").expect("set access");
        storage.set(REFRESH_TOKEN_KEY, "refresh-1").expect("set refresh");

        let reopened = FileTokenStorage::new(&path);
        assert_eq!(reopened.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-1"));
        assert_eq!(reopened.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));

        reopened.remove(ACCESS_TOKEN_KEY).expect("remove");
        assert!(storage.get(ACCESS_TOKEN_KEY).is_none());
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));
    }

    #[cfg(unix)]
    #[test]
    fn file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let path = tmp.path().join("credentials.json");
        let storage = FileTokenStorage::new(&path);
        storage.set(ACCESS_TOKEN_KEY, "secret").expect("set");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credentials file should be 0600");
    }

    #[test]
    fn file_storage_ignores_blank_file() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let path = tmp.path().join("credentials.json");
        fs::write(&path, "   \n  ").expect("write");

        let storage = FileTokenStorage::new(&path);
        assert!(storage.get(ACCESS_TOKEN_KEY).is_none());
        storage.remove(REFRESH_TOKEN_KEY).expect("remove on blank file");
    }

    #[test]
    fn corrupt_file_is_replaced_on_write() {
        let tmp = tempfile::TempDir::new().expect("tmp dir");
        let path = tmp.path().join("credentials.json");
        fs::write(&path, "{ not json").expect("write");

        let storage = FileTokenStorage::new(&path);
        assert!(storage.get(ACCESS_TOKEN_KEY).is_none());

        storage.set(ACCESS_TOKEN_KEY, "access-1").expect("set over corrupt file");
        storage.set(REFRESH_TOKEN_KEY, "refresh-1").expect("set refresh");
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-1"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));
    }
}
