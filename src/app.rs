//! Wiring shared by the binaries: one place that turns a [`Config`] into
//! connected components.

use std::sync::Arc;

use crate::chat::{ChatClient, ChatSession};
use crate::config::Config;
use crate::error::Result;
use crate::extract::TikaExtractor;
use crate::ingest::{self, Collections, Reconciler, SourceDeletion};
use crate::server::QueryServer;
use crate::splitter::TextSplitter;
use crate::store::WeaviateStore;

/// Initialize `env_logger`; `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", default_level)).init();
}

pub struct RagApp {
    pub config: Config,
    pub store: Arc<WeaviateStore>,
}

impl RagApp {
    pub fn new(config: Config) -> Result<Self> {
        let store = WeaviateStore::new(config.weaviate_url()?, config.weaviate_api_key())?;
        log::debug!("Weaviate at {}", store.base_url());
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Load configuration from the environment and connect.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::load()?)
    }

    pub fn collections(&self) -> Collections {
        Collections::from_config(&self.config.weaviate)
    }

    /// Reconciler backed by the configured extraction service.
    ///
    /// Fails before any traversal when extraction or OAuth settings are missing.
    pub fn reconciler(&self) -> Result<Reconciler> {
        let extractor = TikaExtractor::from_config(&self.config)?;
        let splitter = TextSplitter::from_config(&self.config.chunking)?;
        Ok(Reconciler::new(
            self.store.clone(),
            Arc::new(extractor),
            splitter,
            self.collections(),
        ))
    }

    /// Remove everything stored for `source`; no extraction settings needed.
    pub async fn delete_source(&self, source: &str) -> Result<SourceDeletion> {
        ingest::delete_source(self.store.as_ref(), &self.collections(), source).await
    }

    pub fn chat_session(&self, k: usize, neighbors: usize) -> Result<ChatSession> {
        let client = ChatClient::from_config(&self.config.chat, self.config.chat_api_key()?)?;
        Ok(ChatSession::new(
            client,
            self.store.clone(),
            self.config.weaviate.chunk_class.clone(),
            k,
            neighbors,
        ))
    }

    pub fn query_server(&self) -> Result<QueryServer> {
        Ok(QueryServer::new(
            self.store.clone(),
            self.collections(),
            self.config.http_api_key()?,
            self.config.http_server.allowed_origins.clone(),
        ))
    }
}
