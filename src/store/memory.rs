//! In-memory [`DocumentStore`] for tests and offline runs.
//!
//! Records live in a `HashMap` keyed by class behind `std::sync::RwLock`.
//! "Semantic" search is a term-overlap score, which is enough to exercise
//! ranking, limits and neighbor expansion without a vectorizer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::DocumentStore;
use crate::error::{RagweaveError, Result};
use crate::models::{Additional, DeleteSummary, Properties, StoredObject};

/// In-memory store; counts mutating calls so callers can assert "no writes".
#[derive(Default)]
pub struct InMemoryStore {
    objects: RwLock<HashMap<String, Vec<StoredObject>>>,
    writes: AtomicUsize,
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn project(obj: &StoredObject, properties: &[&str]) -> StoredObject {
    let properties = obj
        .properties
        .iter()
        .filter(|(k, _)| properties.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    StoredObject {
        id: obj.id,
        properties,
        additional: obj.additional.clone(),
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<StoredObject>>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<StoredObject>>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of create/patch/delete calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every object of `class`, in insertion order.
    pub fn objects(&self, class: &str) -> Vec<StoredObject> {
        self.read().get(class).cloned().unwrap_or_default()
    }

    /// Objects of `class` whose `source` equals `source`.
    pub fn objects_for_source(&self, class: &str, source: &str) -> Vec<StoredObject> {
        self.objects(class)
            .into_iter()
            .filter(|o| o.source() == Some(source))
            .collect()
    }

    /// Score every object of `class` against `query` over `fields`, best first.
    fn ranked(&self, class: &str, query: &str, fields: &[&str]) -> Vec<StoredObject> {
        let query_terms = terms(query);
        let mut scored: Vec<(usize, StoredObject)> = self
            .read()
            .get(class)
            .map(|objs| {
                objs.iter()
                    .filter_map(|obj| {
                        let haystack: String = fields
                            .iter()
                            .filter_map(|f| obj.properties.get(*f).and_then(Value::as_str))
                            .collect::<Vec<_>>()
                            .join(" ");
                        let score = terms(&haystack).intersection(&query_terms).count();
                        (score > 0).then(|| (score, obj.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        // stable: ties keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let best = scored.first().map(|(s, _)| *s).unwrap_or(1).max(1) as f64;
        scored
            .into_iter()
            .map(|(score, mut obj)| {
                obj.additional = Additional {
                    score: Some(score as f64),
                    certainty: Some(score as f64 / best),
                    distance: Some(1.0 - score as f64 / best),
                };
                obj
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn find_by_source(
        &self,
        class: &str,
        source: &str,
        properties: &[&str],
    ) -> Result<Option<StoredObject>> {
        let mut matches = self.objects_for_source(class, source);
        if matches.len() > 1 {
            return Err(RagweaveError::Integrity(format!(
                "{} records of class {} share source {}",
                matches.len(),
                class,
                source
            )));
        }
        Ok(matches.pop().map(|o| project(&o, properties)))
    }

    async fn create(&self, class: &str, properties: Properties) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.write()
            .entry(class.to_string())
            .or_default()
            .push(StoredObject::new(id, properties));
        Ok(id)
    }

    async fn patch(&self, class: &str, id: Uuid, properties: Properties) -> Result<()> {
        let mut objects = self.write();
        let obj = objects
            .get_mut(class)
            .and_then(|objs| objs.iter_mut().find(|o| o.id == id))
            .ok_or_else(|| RagweaveError::StoreRequest {
                context: format!("patch {}/{}", class, id),
                status: 404,
                body: "object not found".to_string(),
            })?;
        obj.properties.extend(properties);
        Ok(())
    }

    async fn delete_by(&self, class: &str, field: &str, value: &Value) -> Result<DeleteSummary> {
        let mut objects = self.write();
        let Some(objs) = objects.get_mut(class) else {
            return Ok(DeleteSummary::default());
        };
        let before = objs.len();
        objs.retain(|o| o.properties.get(field) != Some(value));
        let removed = (before - objs.len()) as u64;
        Ok(DeleteSummary {
            matches: removed,
            successful: removed,
            failed: 0,
        })
    }

    async fn near_text(
        &self,
        class: &str,
        query: &str,
        k: usize,
        properties: &[&str],
    ) -> Result<Vec<StoredObject>> {
        Ok(self
            .ranked(class, query, &["text"])
            .iter()
            .take(k)
            .map(|o| project(o, properties))
            .collect())
    }

    async fn chunk_range(
        &self,
        class: &str,
        source: &str,
        lo: i64,
        hi: i64,
        properties: &[&str],
    ) -> Result<Vec<StoredObject>> {
        Ok(self
            .objects_for_source(class, source)
            .iter()
            .filter(|o| o.chunk_id().map_or(false, |c| c >= lo && c <= hi))
            .map(|o| project(o, properties))
            .collect())
    }

    async fn search_bm25(
        &self,
        class: &str,
        query: &str,
        properties: &[&str],
        k: usize,
    ) -> Result<Vec<StoredObject>> {
        if properties.is_empty() {
            return Err(RagweaveError::InvalidInput(
                "bm25 search needs at least one property".to_string(),
            ));
        }
        Ok(self
            .ranked(class, query, properties)
            .iter()
            .take(k)
            .map(|o| project(o, properties))
            .collect())
    }

    async fn list(&self, class: &str, properties: &[&str], limit: usize) -> Result<Vec<StoredObject>> {
        Ok(self
            .objects(class)
            .iter()
            .take(limit)
            .map(|o| project(o, properties))
            .collect())
    }
}
