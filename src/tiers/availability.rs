//! Per-credential cache of models the provider exposes

use crate::error::{Result, SidekickError};
use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of the model ids available to a credential
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn list_models(&self, credential: &SecretString) -> Result<Vec<String>>;
}

/// Set of model ids available to one credential
pub type AvailableModels = Arc<HashSet<String>>;

/// Cache of availability lookups, keyed by credential fingerprint.
///
/// A lookup happens at most once per credential; entries are only dropped
/// through [`AvailabilityCache::invalidate`].
#[derive(Clone)]
pub struct AvailabilityCache {
    entries: Cache<String, AvailableModels>,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().max_capacity(16).build(),
        }
    }

    /// SHA-256 hex fingerprint, so raw keys never become cache keys
    pub fn fingerprint(credential: &SecretString) -> String {
        let digest = Sha256::digest(credential.expose_secret().as_bytes());
        hex::encode(digest)
    }

    /// Cached set for `credential`, querying `catalog` on first use
    pub async fn get_or_fetch(
        &self,
        credential: &SecretString,
        catalog: &dyn ModelCatalog,
    ) -> Result<AvailableModels> {
        let key = Self::fingerprint(credential);

        self.entries
            .try_get_with(key, async {
                let models = catalog.list_models(credential).await?;
                info!("Provider reports {} available models", models.len());
                debug!("Available models: {:?}", models);
                Ok::<_, SidekickError>(Arc::new(models.into_iter().collect::<HashSet<_>>()))
            })
            .await
            .map_err(|e| match e.as_ref() {
                SidekickError::Upstream(msg) => SidekickError::Upstream(msg.clone()),
                other => SidekickError::Upstream(other.to_string()),
            })
    }

    /// Whether a lookup for `credential` is already cached
    pub async fn contains(&self, credential: &SecretString) -> bool {
        self.entries.get(&Self::fingerprint(credential)).await.is_some()
    }

    /// Forget the lookup for `credential`
    pub async fn invalidate(&self, credential: &SecretString) {
        self.entries.invalidate(&Self::fingerprint(credential)).await;
    }
}

impl Default for AvailabilityCache {
    fn default() -> Self {
        Self::new()
    }
}
