//! Credential lookup for audited hosts

use crate::models::{CredentialProfile, Credentials};
use crate::utils::CredentialError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Platform-agnostic credential storage
///
/// Implementations may be backed by a config file, an OS keychain or a vault.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve credentials by profile
    ///
    /// # Returns
    /// * `Ok(Some(credentials))` - If credentials exist
    /// * `Ok(None)` - If no credentials stored (not an error)
    /// * `Err(CredentialError)` - If an error occurred during retrieval
    ///
    /// # Security
    /// - MUST NOT log secret values
    async fn retrieve(
        &self,
        profile: &CredentialProfile,
    ) -> Result<Option<Credentials>, CredentialError>;
}

/// In-memory store populated from the machines file
#[derive(Debug, Default, Clone)]
pub struct StaticCredentialStore {
    entries: HashMap<CredentialProfile, Credentials>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: CredentialProfile, credentials: Credentials) {
        self.entries.insert(profile, credentials);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn retrieve(
        &self,
        profile: &CredentialProfile,
    ) -> Result<Option<Credentials>, CredentialError> {
        Ok(self.entries.get(profile).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SecureString, Username};

    #[tokio::test]
    async fn test_static_store_round_trip() {
        let mut store = StaticCredentialStore::new();
        let profile = CredentialProfile::for_host("db01");
        store.insert(
            profile.clone(),
            Credentials::new(Username::new("ops").unwrap(), SecureString::new("pw")),
        );

        let found = store.retrieve(&profile).await.unwrap().unwrap();
        assert_eq!(found.username().as_str(), "ops");

        let missing = store
            .retrieve(&CredentialProfile::for_host("other"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
