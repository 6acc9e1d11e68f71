//! OpenAI-compatible model listing

use crate::error::{Result, SidekickError};
use crate::tiers::ModelCatalog;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Lists models through `GET {base}/models`
pub struct OpenAiCatalog {
    client: Client,
    base_url: String,
}

impl OpenAiCatalog {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SidekickError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ModelCatalog for OpenAiCatalog {
    async fn list_models(&self, credential: &SecretString) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        debug!("Listing models from {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(credential.expose_secret())
            .send()
            .await
            .map_err(|e| SidekickError::Upstream(format!("model listing failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SidekickError::Upstream(format!("HTTP {}: {}", status, body)));
        }

        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| SidekickError::Upstream(format!("Failed to parse model listing: {}", e)))?;

        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SecretString {
        SecretString::new("sk-test".to_string())
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/models")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"object":"list","data":[{"id":"gpt-4","object":"model"},{"id":"gpt-3.5-turbo","object":"model"}]}"#)
            .create_async()
            .await;

        let catalog = OpenAiCatalog::new(format!("{}/", server.url()), Duration::from_secs(5)).unwrap();
        let models = catalog.list_models(&key()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(models, vec!["gpt-4", "gpt-3.5-turbo"]);
    }

    #[tokio::test]
    async fn test_unauthorized_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(401)
            .with_body("invalid key")
            .create_async()
            .await;

        let catalog = OpenAiCatalog::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = catalog.list_models(&key()).await.unwrap_err();

        match err {
            SidekickError::Upstream(msg) => assert!(msg.contains("401")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
