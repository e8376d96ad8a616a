//! Plain-text extraction through a Tika-style HTTP service.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenProvider;
use crate::config::{Config, ExtractionSettings};
use crate::error::{RagweaveError, Result};

/// Turns a file into plain text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String>;
}

/// `PUT`s the raw file to the extraction endpoint and reads back text.
pub struct TikaExtractor {
    client: Client,
    endpoint: String,
    tokens: Option<Arc<TokenProvider>>,
}

impl TikaExtractor {
    pub fn new(client: Client, settings: ExtractionSettings, tokens: Option<Arc<TokenProvider>>) -> Self {
        Self {
            client,
            endpoint: settings.endpoint,
            tokens,
        }
    }

    /// Build from configuration; fails when the endpoint or OAuth values
    /// are missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.extraction_settings()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| RagweaveError::Config(format!("failed to build HTTP client: {}", e)))?;
        let tokens = TokenProvider::new(client.clone(), config.oauth_settings()?);
        Ok(Self::new(client, settings, Some(Arc::new(tokens))))
    }
}

#[async_trait]
impl Extractor for TikaExtractor {
    async fn extract(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        log::debug!("Extracting {} ({} bytes)", path.display(), bytes.len());

        let mut request = self
            .client
            .put(&self.endpoint)
            .header(ACCEPT, "text/plain")
            .body(bytes);
        if let Some(tokens) = &self.tokens {
            request = request.bearer_auth(tokens.bearer().await?);
        }

        let response = request.send().await.map_err(|e| {
            RagweaveError::Extraction(format!("{}: request failed: {}", path.display(), e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RagweaveError::Extraction(format!(
                "{}: extraction service returned {}: {}",
                path.display(),
                status,
                body
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            RagweaveError::Extraction(format!("{}: reading response failed: {}", path.display(), e))
        })?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
