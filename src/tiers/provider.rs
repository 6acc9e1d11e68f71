//! Provider context threaded through model selection

use super::availability::{AvailabilityCache, AvailableModels, ModelCatalog};
use super::table::{ProviderMode, TierTable};
use crate::error::Result;
use secrecy::SecretString;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Everything model selection needs to know about the provider.
///
/// Built once at startup and passed explicitly; the availability cache
/// lives here rather than in process-global state.
pub struct ProviderContext {
    mode: ProviderMode,
    credential: SecretString,
    base_url: String,
    catalog: Arc<dyn ModelCatalog>,
    availability: AvailabilityCache,
}

impl ProviderContext {
    pub fn new(
        mode: ProviderMode,
        credential: SecretString,
        base_url: impl Into<String>,
        catalog: Arc<dyn ModelCatalog>,
    ) -> Self {
        Self {
            mode,
            credential,
            base_url: base_url.into(),
            catalog,
            availability: AvailabilityCache::new(),
        }
    }

    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    pub fn credential(&self) -> &SecretString {
        &self.credential
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn availability(&self) -> &AvailabilityCache {
        &self.availability
    }

    /// Models usable with the current credential.
    ///
    /// Gateway mode trusts its own table; direct mode asks the provider
    /// (once per credential).
    pub async fn available_models(&self, table: &TierTable) -> Result<AvailableModels> {
        match self.mode {
            ProviderMode::Gateway => Ok(Arc::new(
                table.names().map(String::from).collect::<HashSet<_>>(),
            )),
            ProviderMode::Direct => {
                self.availability
                    .get_or_fetch(&self.credential, self.catalog.as_ref())
                    .await
            }
        }
    }

    /// Swap the credential, dropping the cached lookup for the old one
    pub async fn replace_credential(&mut self, credential: SecretString) {
        self.availability.invalidate(&self.credential).await;
        self.credential = credential;
        info!("Provider credential replaced; availability will be re-queried");
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("mode", &self.mode)
            .field("credential", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticCatalog {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelCatalog for StaticCatalog {
        async fn list_models(&self, _credential: &SecretString) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["gpt-4".into()])
        }
    }

    #[tokio::test]
    async fn test_gateway_skips_catalog() {
        let catalog = Arc::new(StaticCatalog {
            calls: AtomicUsize::new(0),
        });
        let ctx = ProviderContext::new(
            ProviderMode::Gateway,
            SecretString::new("or-key".into()),
            "https://gateway.test",
            catalog.clone(),
        );
        let table = TierTable::for_mode(ProviderMode::Gateway);
        let models = ctx.available_models(&table).await.unwrap();

        assert!(models.contains("openai/gpt-4"));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replace_credential_invalidates() {
        let catalog = Arc::new(StaticCatalog {
            calls: AtomicUsize::new(0),
        });
        let mut ctx = ProviderContext::new(
            ProviderMode::Direct,
            SecretString::new("sk-old".into()),
            "https://api.test",
            catalog.clone(),
        );
        let table = TierTable::for_mode(ProviderMode::Direct);

        ctx.available_models(&table).await.unwrap();
        ctx.available_models(&table).await.unwrap();
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);

        let old = SecretString::new("sk-old".into());
        ctx.replace_credential(SecretString::new("sk-new".into())).await;
        assert!(!ctx.availability().contains(&old).await);

        ctx.available_models(&table).await.unwrap();
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_redacts_credential() {
        let ctx = ProviderContext::new(
            ProviderMode::Direct,
            SecretString::new("sk-hidden".into()),
            "https://api.test",
            Arc::new(StaticCatalog {
                calls: AtomicUsize::new(0),
            }),
        );
        assert!(!format!("{:?}", ctx).contains("sk-hidden"));
    }
}
