//! OAuth2 client-credentials tokens for the extraction service.
//!
//! Tokens are cached in memory and in a JSON token file, and are refreshed
//! once they are within [`EXPIRY_SKEW_SECS`] of expiring.

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

use crate::config::OAuthSettings;
use crate::error::{RagweaveError, Result};

/// A token is refreshed this many seconds before it actually expires.
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// Lifetime assumed when the token endpoint does not report `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 300;

/// Access token as returned by the token endpoint, stamped with its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl Token {
    /// Usable for at least [`EXPIRY_SKEW_SECS`] more seconds.
    pub fn is_fresh(&self, now: i64) -> bool {
        self.expires_at
            .map_or(false, |expires_at| now + EXPIRY_SKEW_SECS < expires_at)
    }
}

fn load_token(path: &Path) -> Option<Token> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(token) => Some(token),
        Err(e) => {
            log::warn!("Ignoring unreadable token file {}: {}", path.display(), e);
            None
        }
    }
}

fn save_token(path: &Path, token: &Token) -> Result<()> {
    let json = serde_json::to_string_pretty(token)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Supplies bearer tokens obtained through the client-credentials grant.
pub struct TokenProvider {
    client: Client,
    settings: OAuthSettings,
    cached: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn new(client: Client, settings: OAuthSettings) -> Self {
        Self {
            client,
            settings,
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, fetching a new one only when needed.
    pub async fn bearer(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.access_token.clone());
        }

        if let Some(token) = load_token(&self.settings.token_file).filter(|t| t.is_fresh(now)) {
            log::debug!("Using token from {}", self.settings.token_file.display());
            let access_token = token.access_token.clone();
            *cached = Some(token);
            return Ok(access_token);
        }

        let token = self.fetch().await?;
        if let Err(e) = save_token(&self.settings.token_file, &token) {
            log::warn!(
                "Could not write token file {}: {}",
                self.settings.token_file.display(),
                e
            );
        }
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn fetch(&self) -> Result<Token> {
        log::info!("Requesting access token from {}", self.settings.token_endpoint);

        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = self.settings.scope.as_deref() {
            form.push(("scope", scope));
        }

        let response = self
            .client
            .post(&self.settings.token_endpoint)
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| RagweaveError::Extraction(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RagweaveError::Extraction(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let mut token: Token = response
            .json()
            .await
            .map_err(|e| RagweaveError::Extraction(format!("invalid token response: {}", e)))?;
        token.expires_at =
            Some(Utc::now().timestamp() + token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        Ok(token)
    }
}
