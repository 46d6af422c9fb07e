//! Credentials persistence trait abstraction.
//!
//! Lets the session survive restarts without tying [`SessionContext`] to a
//! particular storage backend.
//!
//! [`SessionContext`]: crate::auth::SessionContext

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::Credential;

/// Credentials operation errors.
#[derive(Debug, Clone, Error)]
pub enum CredentialsError {
    /// Failed to load credentials
    #[error("Failed to load credentials: {0}")]
    LoadFailed(String),
    /// Failed to save credentials
    #[error("Failed to save credentials: {0}")]
    SaveFailed(String),
    /// Failed to clear credentials
    #[error("Failed to clear credentials: {0}")]
    ClearFailed(String),
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Trait for credentials storage and retrieval.
///
/// # Example
///
/// ```ignore
/// use mailpilot::traits::CredentialsProvider;
///
/// async fn restore<P: CredentialsProvider>(provider: &P) -> Option<Credential> {
///     provider.load().await.ok().flatten().filter(|c| !c.is_expired())
/// }
/// ```
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Load the stored credential.
    ///
    /// # Returns
    /// - `Ok(Some(credential))` if one was stored
    /// - `Ok(None)` if nothing is stored
    /// - `Err(error)` if loading failed
    async fn load(&self) -> Result<Option<Credential>, CredentialsError>;

    /// Store a credential, replacing any previous one.
    async fn save(&self, credential: &Credential) -> Result<(), CredentialsError>;

    /// Remove the stored credential.
    async fn clear(&self) -> Result<(), CredentialsError>;
}
