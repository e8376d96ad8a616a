//! Document store abstraction.
//!
//! [`DocumentStore`] is the contract the reconciler and the query surfaces
//! rely on. [`WeaviateStore`](weaviate::WeaviateStore) maps it onto
//! Weaviate's REST and GraphQL API; [`InMemoryStore`](memory::InMemoryStore)
//! backs tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`find_by_source`](DocumentStore::find_by_source) | Unique lookup by `source`; duplicates are an integrity violation |
//! | [`create`](DocumentStore::create) | Insert a record, returning its id |
//! | [`patch`](DocumentStore::patch) | Partial update |
//! | [`delete_by`](DocumentStore::delete_by) | Bulk delete where `field == value` |
//! | [`search_near_text`](DocumentStore::search_near_text) | Semantic search with optional neighbor expansion |
//! | [`search_bm25`](DocumentStore::search_bm25) | Keyword search |
//! | [`list`](DocumentStore::list) | Unfiltered listing |

pub mod memory;
pub mod schema;
pub mod weaviate;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{DeleteSummary, DocumentChunk, Properties, Record, StoredObject};

pub use memory::InMemoryStore;
pub use weaviate::WeaviateStore;

/// Upper bound for unfiltered listings.
pub const DEFAULT_LIST_LIMIT: usize = 10_000;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up the single record of `class` whose `source` equals `source`.
    ///
    /// Fails with [`RagweaveError::Integrity`](crate::error::RagweaveError::Integrity)
    /// when more than one record matches.
    async fn find_by_source(
        &self,
        class: &str,
        source: &str,
        properties: &[&str],
    ) -> Result<Option<StoredObject>>;

    async fn create(&self, class: &str, properties: Properties) -> Result<Uuid>;

    /// Update only the given properties of an existing record.
    async fn patch(&self, class: &str, id: Uuid, properties: Properties) -> Result<()>;

    /// Delete every record of `class` whose `field` equals `value`.
    ///
    /// Best effort: the summary reports what the store matched and removed.
    async fn delete_by(&self, class: &str, field: &str, value: &Value) -> Result<DeleteSummary>;

    /// Top-`k` semantic matches for `query`, best first.
    async fn near_text(
        &self,
        class: &str,
        query: &str,
        k: usize,
        properties: &[&str],
    ) -> Result<Vec<StoredObject>>;

    /// Chunks of `source` whose `chunk_id` lies in `[lo, hi]`.
    async fn chunk_range(
        &self,
        class: &str,
        source: &str,
        lo: i64,
        hi: i64,
        properties: &[&str],
    ) -> Result<Vec<StoredObject>>;

    /// Keyword search over `properties`, which are also the returned fields.
    async fn search_bm25(
        &self,
        class: &str,
        query: &str,
        properties: &[&str],
        k: usize,
    ) -> Result<Vec<StoredObject>>;

    async fn list(&self, class: &str, properties: &[&str], limit: usize) -> Result<Vec<StoredObject>>;

    /// Semantic search over chunks.
    ///
    /// With `expand_neighbors > 0`, every hit pulls in the chunks of the same
    /// source whose `chunk_id` is within `expand_neighbors` of its own; the
    /// combined set is deduplicated and ordered by `chunk_id`.
    async fn search_near_text(
        &self,
        class: &str,
        query: &str,
        k: usize,
        expand_neighbors: usize,
    ) -> Result<Vec<StoredObject>> {
        let hits = self.near_text(class, query, k, DocumentChunk::PROPERTIES).await?;
        if expand_neighbors == 0 {
            return Ok(hits);
        }

        let n = i64::try_from(expand_neighbors).unwrap_or(i64::MAX);
        let mut neighbors = Vec::new();
        for hit in &hits {
            let (Some(source), Some(chunk_id)) = (hit.source(), hit.chunk_id()) else {
                log::warn!("Hit {} has no source/chunk_id, skipping neighbor expansion", hit.id);
                continue;
            };
            let lo = chunk_id.saturating_sub(n).max(0);
            let hi = chunk_id.saturating_add(n);
            let found = self
                .chunk_range(class, source, lo, hi, DocumentChunk::PROPERTIES)
                .await?;
            log::debug!(
                "Expanded {}#{} with {} neighbor(s) in [{}, {}]",
                source,
                chunk_id,
                found.len(),
                lo,
                hi
            );
            neighbors.extend(found);
        }

        Ok(merge_neighbors(hits, neighbors))
    }
}

/// Merge hits with their neighbors: deduplicate by id (hits win, keeping
/// their scores) and order by `(chunk_id, source)`.
pub fn merge_neighbors(hits: Vec<StoredObject>, neighbors: Vec<StoredObject>) -> Vec<StoredObject> {
    let mut seen = HashSet::new();
    let mut merged: Vec<StoredObject> = hits
        .into_iter()
        .chain(neighbors)
        .filter(|obj| seen.insert(obj.id))
        .collect();

    merged.sort_by(|a, b| {
        let ka = (a.chunk_id().unwrap_or(i64::MAX), a.source().unwrap_or(""));
        let kb = (b.chunk_id().unwrap_or(i64::MAX), b.source().unwrap_or(""));
        ka.cmp(&kb)
    });
    merged
}
