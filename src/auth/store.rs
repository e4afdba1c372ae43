//! Durable storage for the single process-wide refresh token.
//!
//! The file on disk always holds the token from the most recent successful
//! exchange or refresh; every save overwrites the previous value. There is no
//! locking: the render queue guarantees one active job, and concurrent
//! processes sharing the file are out of scope.

use std::fs;
use std::path::{Path, PathBuf};

use super::AuthError;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the persisted refresh token.
    pub fn save(&self, refresh_token: &str) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(AuthError::Store)?;
            }
        }
        fs::write(&self.path, refresh_token).map_err(AuthError::Store)
    }

    /// Load the persisted refresh token. `None` is not an error: it signals
    /// that interactive authorization is required.
    pub fn load(&self) -> Result<Option<String>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(AuthError::Store)?;
        let token = raw.trim();
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(token.to_string()))
        }
    }
}
