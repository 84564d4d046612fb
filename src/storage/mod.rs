//! Durable custody of the current token set
//!
//! [`SecureStorage`] is the byte-level get/set/delete contract an
//! application backs with its platform credential store. [`TokenStore`]
//! layers the serialized [`TokenSet`] on top of it under one key.
//!
//! Two storages ship with the crate:
//!
//! - [`FileStorage`] - one file per key with user-only permissions (600)
//! - [`MemoryStorage`] - process-local, for tests and ephemeral sessions

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::sync::Arc;
use thiserror::Error;

use crate::error::AuthError;
use crate::types::TokenSet;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::storage(err.to_string())
    }
}

/// Secure-at-rest key/value storage
pub trait SecureStorage: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Errors
    /// Returns an error if the backend cannot be read; a missing key is `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`; removing a missing key succeeds
    ///
    /// # Errors
    /// Returns an error if the key exists but cannot be removed.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: SecureStorage + ?Sized> SecureStorage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }
}

/// Token set persistence over a [`SecureStorage`]
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn SecureStorage>,
    key: String,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").field("key", &self.key).finish()
    }
}

impl TokenStore {
    /// Create a token store writing under `key`
    pub fn new(storage: Arc<dyn SecureStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Storage key in use
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted token set, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored bytes are not a token set.
    pub fn load(&self) -> Result<Option<TokenSet>, StorageError> {
        match self.storage.get(&self.key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist `tokens`, replacing the previous set
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub fn save(&self, tokens: &TokenSet) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(tokens)?;
        self.storage.set(&self.key, &bytes)
    }

    /// Remove the persisted token set
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.delete(&self.key)
    }
}
