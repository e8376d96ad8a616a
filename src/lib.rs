pub mod app;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod server;
pub mod splitter;
pub mod store;

#[cfg(test)]
mod test_support;

pub use app::RagApp;
pub use config::Config;
pub use error::{RagweaveError, Result};
pub use models::{Document, DocumentChunk, Record, StoredObject};
pub use store::{DocumentStore, InMemoryStore, WeaviateStore};
