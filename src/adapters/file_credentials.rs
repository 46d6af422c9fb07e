//! File-based credentials provider.
//!
//! Stores the credential as JSON at `~/.mailpilot/credentials.json`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::auth::Credential;
use crate::traits::{CredentialsError, CredentialsProvider};

/// The credentials directory name.
const CREDENTIALS_DIR: &str = ".mailpilot";

/// The credentials file name.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Credentials provider backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialsProvider {
    path: PathBuf,
}

impl FileCredentialsProvider {
    /// Use the default location under the home directory.
    pub fn new() -> Result<Self, CredentialsError> {
        let home = dirs::home_dir().ok_or_else(|| {
            CredentialsError::LoadFailed("Could not determine home directory".to_string())
        })?;
        Ok(Self::with_path(home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE)))
    }

    /// Use an explicit file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn credentials_path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialsProvider for FileCredentialsProvider {
    async fn load(&self) -> Result<Option<Credential>, CredentialsError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialsError::LoadFailed(e.to_string())),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CredentialsError::Serialization(e.to_string()))
    }

    async fn save(&self, credential: &Credential) -> Result<(), CredentialsError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| CredentialsError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, permissions)
                .await
                .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialsError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialsError::ClearFailed(e.to_string())),
        }
    }
}
