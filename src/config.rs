use crate::error::{RagweaveError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ragweave: RagweaveConfig,
    #[serde(default)]
    pub weaviate: WeaviateConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagweaveConfig {
    pub log_level: String,
}

impl Default for RagweaveConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Vector database settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeaviateConfig {
    /// Base URL of the Weaviate instance (overridden by `WEAVIATE_URL`)
    pub url: Option<String>,
    /// Name of the environment variable holding the bearer API key
    pub api_key_env: String,
    pub document_class: String,
    pub chunk_class: String,
    /// Vectorizer module used for the chunk class
    pub vectorizer: String,
    pub vectorizer_model: String,
    pub vectorizer_endpoint: String,
}

impl Default for WeaviateConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key_env: "WEAVIATE_API_KEY".to_string(),
            document_class: "Document".to_string(),
            chunk_class: "DocumentChunk".to_string(),
            vectorizer: "text2vec-ollama".to_string(),
            vectorizer_model: "nomic-embed-text".to_string(),
            vectorizer_endpoint: "http://ollama:11434".to_string(),
        }
    }
}

/// Text extraction service settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Tika-style extract endpoint (overridden by `TIKA_EXTRACT_ENDPOINT`)
    pub endpoint: Option<String>,
}

/// OAuth2 client-credentials settings for the extraction service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret_env: String,
    pub scope: Option<String>,
    pub token_endpoint: Option<String>,
    pub token_file: PathBuf,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret_env: "OIDC_CLIENT_SECRET".to_string(),
            scope: None,
            token_endpoint: None,
            token_file: PathBuf::from("token.json"),
        }
    }
}

/// Chunk splitter parameters (in characters)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Chat model settings (any OpenAI-compatible endpoint)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub k: usize,
    pub neighbors: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            k: 3,
            neighbors: 1,
        }
    }
}

/// HTTP query API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    pub port: u16,
    pub api_key_env: String,
    pub allowed_origins: Vec<String>,
    pub authless: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            api_key_env: "RAGWEAVE_API_KEY".to_string(),
            allowed_origins: vec![],
            authless: false,
        }
    }
}

/// Resolved extraction settings
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub endpoint: String,
}

/// Resolved OAuth2 client-credentials settings
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
    pub token_endpoint: String,
    pub token_file: PathBuf,
}

/// Read an environment variable, treating an empty value as unset.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration.
    ///
    /// Loads `.env` (if present), then reads the TOML file named by
    /// `RAGWEAVE_CONFIG`, falling back to `./config.toml`. The default file is
    /// optional; an explicitly named file must exist. Environment variables
    /// override the file (see [`Config::apply_env_overrides`]).
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let (config_path, explicit) = match env_value("RAGWEAVE_CONFIG") {
            Some(p) => (PathBuf::from(p), true),
            None => (PathBuf::from("config.toml"), false),
        };

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else if explicit {
            return Err(RagweaveError::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        } else {
            log::debug!("No config.toml found, using defaults and environment");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML config file without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            RagweaveError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&config_str)
    }

    /// Parse TOML config text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RagweaveError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Override file values from `WEAVIATE_URL`, `TIKA_EXTRACT_ENDPOINT` and the `OIDC_*` / `TOKEN_FILE` variables.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_value("WEAVIATE_URL") {
            self.weaviate.url = Some(v);
        }
        if let Some(v) = env_value("TIKA_EXTRACT_ENDPOINT") {
            self.extraction.endpoint = Some(v);
        }
        if let Some(v) = env_value("OIDC_CLIENT_ID") {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = env_value("OIDC_SCOPE") {
            self.oauth.scope = Some(v);
        }
        if let Some(v) = env_value("OIDC_TOKEN_ENDPOINT") {
            self.oauth.token_endpoint = Some(v);
        }
        if let Some(v) = env_value("TOKEN_FILE") {
            self.oauth.token_file = PathBuf::from(v);
        }
    }

    /// Validate values every command needs.
    pub fn validate(&self) -> Result<()> {
        if self.weaviate.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(RagweaveError::ConfigMissing(
                "weaviate.url (or WEAVIATE_URL) is not set".to_string(),
            ));
        }

        if self.chunking.chunk_size == 0 {
            return Err(RagweaveError::Config(
                "chunking.chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RagweaveError::Config(
                "chunking.chunk_overlap must be less than chunk_size".to_string(),
            ));
        }

        if self.weaviate.document_class == self.weaviate.chunk_class {
            return Err(RagweaveError::Config(
                "weaviate.document_class and weaviate.chunk_class must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Weaviate base URL (validated at load)
    pub fn weaviate_url(&self) -> Result<&str> {
        self.weaviate
            .url
            .as_deref()
            .ok_or_else(|| RagweaveError::ConfigMissing("weaviate.url".to_string()))
    }

    /// Weaviate API key, if the configured variable is set
    pub fn weaviate_api_key(&self) -> Option<String> {
        env_value(&self.weaviate.api_key_env)
    }

    /// Extraction endpoint; required by every ingestion entry point.
    pub fn extraction_settings(&self) -> Result<ExtractionSettings> {
        let endpoint = self.extraction.endpoint.clone().ok_or_else(|| {
            RagweaveError::ConfigMissing(
                "extraction.endpoint (or TIKA_EXTRACT_ENDPOINT) is not set".to_string(),
            )
        })?;
        Ok(ExtractionSettings { endpoint })
    }

    /// OAuth settings for the extraction service; token endpoint, client id
    /// and secret are all required.
    pub fn oauth_settings(&self) -> Result<OAuthSettings> {
        let token_endpoint = self.oauth.token_endpoint.clone().ok_or_else(|| {
            RagweaveError::ConfigMissing(
                "oauth.token_endpoint (or OIDC_TOKEN_ENDPOINT) is not set".to_string(),
            )
        })?;

        let client_id = self.oauth.client_id.clone().ok_or_else(|| {
            RagweaveError::ConfigMissing("oauth.client_id (or OIDC_CLIENT_ID) is not set".to_string())
        })?;

        let client_secret = env_value(&self.oauth.client_secret_env).ok_or_else(|| {
            RagweaveError::ConfigMissing(format!(
                "Environment variable {} not set",
                self.oauth.client_secret_env
            ))
        })?;

        Ok(OAuthSettings {
            client_id,
            client_secret,
            scope: self.oauth.scope.clone(),
            token_endpoint,
            token_file: self.oauth.token_file.clone(),
        })
    }

    /// API key clients must present to the HTTP server; `None` when authless
    pub fn http_api_key(&self) -> Result<Option<String>> {
        if self.http_server.authless {
            return Ok(None);
        }
        env_value(&self.http_server.api_key_env).map(Some).ok_or_else(|| {
            RagweaveError::ConfigMissing(format!(
                "Environment variable {} not set. Set it in your .env file or enable authless mode.",
                self.http_server.api_key_env
            ))
        })
    }

    /// Chat model API key
    pub fn chat_api_key(&self) -> Result<String> {
        env_value(&self.chat.api_key_env).ok_or_else(|| {
            RagweaveError::ConfigMissing(format!(
                "Environment variable {} not set",
                self.chat.api_key_env
            ))
        })
    }
}
