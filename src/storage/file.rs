//! File-backed secure storage

use std::path::{Path, PathBuf};

use super::{SecureStorage, StorageError};

/// Stores each key as a file with user-only permissions
///
/// Keys map to `{dir}/{key}.json`; any character outside `[A-Za-z0-9._-]`
/// is replaced by `_`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStorage {
    /// Create storage in the platform config directory
    /// (e.g. `~/.config/oidc-auth-session/` on Linux)
    #[must_use]
    pub fn new() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oidc-auth-session");
        Self { dir }
    }

    /// Create storage in a custom directory
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Directory holding the files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path used for `key`
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl SecureStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);

        std::fs::write(&path, value)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::with_dir(temp_dir.path().join("nested"));

        assert!(storage.get("tokens").unwrap().is_none());
        storage.set("tokens", b"{\"a\":1}").unwrap();
        assert_eq!(storage.get("tokens").unwrap().as_deref(), Some(&b"{\"a\":1}"[..]));

        storage.delete("tokens").unwrap();
        assert!(storage.get("tokens").unwrap().is_none());
        storage.delete("tokens").unwrap();
    }

    #[test]
    fn test_key_is_sanitized() {
        let storage = FileStorage::with_dir(PathBuf::from("/tmp/x"));
        assert_eq!(
            storage.path_for("../app/token set"),
            PathBuf::from("/tmp/x/.._app_token_set.json")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions_are_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::with_dir(temp_dir.path().to_path_buf());
        storage.set("tokens", b"secret").unwrap();

        let mode = std::fs::metadata(storage.path_for("tokens"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
