//! In-memory credentials provider for testing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::auth::Credential;
use crate::traits::{CredentialsError, CredentialsProvider};

/// In-memory credentials provider.
///
/// Each operation can be told to fail, for exercising the session's
/// "persistence failures are never fatal" paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentials {
    credential: Arc<Mutex<Option<Credential>>>,
    save_should_fail: Arc<Mutex<bool>>,
    load_should_fail: Arc<Mutex<bool>>,
    clear_should_fail: Arc<Mutex<bool>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider that already holds `credential`.
    pub fn with_credential(credential: Credential) -> Self {
        let provider = Self::new();
        provider.set_credential(Some(credential));
        provider
    }

    pub fn set_save_should_fail(&self, should_fail: bool) {
        *self.save_should_fail.lock().unwrap() = should_fail;
    }

    pub fn set_load_should_fail(&self, should_fail: bool) {
        *self.load_should_fail.lock().unwrap() = should_fail;
    }

    pub fn set_clear_should_fail(&self, should_fail: bool) {
        *self.clear_should_fail.lock().unwrap() = should_fail;
    }

    /// Current stored credential, read synchronously.
    pub fn get_credential(&self) -> Option<Credential> {
        self.credential.lock().unwrap().clone()
    }

    pub fn set_credential(&self, credential: Option<Credential>) {
        *self.credential.lock().unwrap() = credential;
    }
}

#[async_trait]
impl CredentialsProvider for InMemoryCredentials {
    async fn load(&self) -> Result<Option<Credential>, CredentialsError> {
        if *self.load_should_fail.lock().unwrap() {
            return Err(CredentialsError::LoadFailed("Mock load failure".to_string()));
        }
        Ok(self.get_credential())
    }

    async fn save(&self, credential: &Credential) -> Result<(), CredentialsError> {
        if *self.save_should_fail.lock().unwrap() {
            return Err(CredentialsError::SaveFailed("Mock save failure".to_string()));
        }
        self.set_credential(Some(credential.clone()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialsError> {
        if *self.clear_should_fail.lock().unwrap() {
            return Err(CredentialsError::ClearFailed("Mock clear failure".to_string()));
        }
        self.set_credential(None);
        Ok(())
    }
}
