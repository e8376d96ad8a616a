//! Incremental ingestion: re-ingest a file only when its stored Document is
//! missing or out of date, keeping Documents and their chunks consistent.
//!
//! Per file:
//! - absent: delete orphaned chunks for the source, then run the pipeline
//! - stale: delete the Document(s) and chunks for the source, then run the pipeline
//! - fresh: skip
//!
//! The pipeline is extract, create Document (`vectorized = false`), split,
//! create one chunk per piece, then patch the Document to `vectorized = true`.
//! A failure part-way leaves the Document unvectorized, so the next run
//! picks the file up again.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::WeaviateConfig;
use crate::error::Result;
use crate::extract::Extractor;
use crate::ingest::freshness::{self, Freshness};
use crate::ingest::walker::{self, FileDescriptor};
use crate::models::{DeleteSummary, Document, DocumentChunk, Properties, Record};
use crate::splitter::TextSplitter;
use crate::store::DocumentStore;

/// Class names for the two record kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub documents: String,
    pub chunks: String,
}

impl Collections {
    pub fn from_config(config: &WeaviateConfig) -> Self {
        Self {
            documents: config.document_class.clone(),
            chunks: config.chunk_class.clone(),
        }
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self::from_config(&WeaviateConfig::default())
    }
}

/// What to do when one file of a walk fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop at the first failure and return it.
    #[default]
    Abort,
    /// Record the failure in the report and go on with the next file.
    Continue,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub recursive: bool,
    /// Re-ingest files even when they are fresh.
    pub force: bool,
    pub on_error: ErrorPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped,
    Ingested { chunks: usize, replaced: bool },
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub ingested: usize,
    /// Subset of `ingested` that replaced a stale Document
    pub replaced: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub chunks: usize,
}

/// Records removed by [`delete_source`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceDeletion {
    pub documents: DeleteSummary,
    pub chunks: DeleteSummary,
}

/// Delete the Document(s) and chunks recorded for `source`.
///
/// Needs only the store, so it works without extraction settings and for
/// files that no longer exist.
pub async fn delete_source(
    store: &dyn DocumentStore,
    collections: &Collections,
    source: &str,
) -> Result<SourceDeletion> {
    let value = Value::String(source.to_string());
    let documents = store.delete_by(&collections.documents, "source", &value).await?;
    let chunks = store.delete_by(&collections.chunks, "source", &value).await?;
    log::debug!(
        "Deleted {} document(s) and {} chunk(s) for {}",
        documents.successful,
        chunks.successful,
        source
    );
    Ok(SourceDeletion { documents, chunks })
}

pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn Extractor>,
    splitter: TextSplitter,
    collections: Collections,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn Extractor>,
        splitter: TextSplitter,
        collections: Collections,
    ) -> Self {
        Self {
            store,
            extractor,
            splitter,
            collections,
        }
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    /// Ingest a file, or every file under a directory when `recursive` is set.
    ///
    /// Path problems (missing path, directory without `recursive`) fail before
    /// any file is touched.
    pub async fn ingest_path(&self, path: &Path, options: &IngestOptions) -> Result<IngestReport> {
        let files: Vec<Result<FileDescriptor>> = walker::walk(path, options.recursive)?.collect();
        let total = files.len();
        log::info!("Found {} file(s) under {}", total, path.display());

        let mut report = IngestReport::default();

        for (i, file) in files.into_iter().enumerate() {
            let outcome = match file {
                Ok(file) => {
                    log::info!("[{}/{}] Processing: {}", i + 1, total, file.path.display());
                    self.ingest_file(&file, options.force)
                        .await
                        .map_err(|e| (file.path.clone(), e))
                }
                Err(e) => Err((path.to_path_buf(), e)),
            };

            match outcome {
                Ok(FileOutcome::Skipped) => {
                    log::info!("  ↷ Unchanged, skipped");
                    report.skipped += 1;
                }
                Ok(FileOutcome::Ingested { chunks, replaced }) => {
                    log::info!("  ✓ {} chunk(s){}", chunks, if replaced { " (replaced)" } else { "" });
                    report.ingested += 1;
                    report.chunks += chunks;
                    if replaced {
                        report.replaced += 1;
                    }
                }
                Err((failed_path, e)) => {
                    log::error!("  ✗ {}: {}", failed_path.display(), e);
                    if options.on_error == ErrorPolicy::Abort {
                        return Err(e);
                    }
                    report.failed.push((failed_path, e.to_string()));
                }
            }
        }

        log::info!("=== Ingestion Complete ===");
        log::info!(
            "Ingested: {} ({} replaced), skipped: {}, failed: {}, chunks: {}",
            report.ingested,
            report.replaced,
            report.skipped,
            report.failed.len(),
            report.chunks
        );
        Ok(report)
    }

    /// Reconcile one file with the store.
    pub async fn ingest_file(&self, file: &FileDescriptor, force: bool) -> Result<FileOutcome> {
        let source = file.source();
        let existing = self.lookup(&source).await?;

        let replaced = match freshness::compare(existing.as_ref(), file.size, file.modified) {
            Freshness::Fresh if !force => return Ok(FileOutcome::Skipped),
            Freshness::Fresh => {
                log::debug!("{} is fresh, re-ingesting anyway", source);
                self.delete_source(&source).await?;
                true
            }
            Freshness::Stale(reason) => {
                log::info!("  {} is stale: {}", source, reason);
                self.delete_source(&source).await?;
                true
            }
            Freshness::Absent => {
                let orphans = self
                    .store
                    .delete_by(&self.collections.chunks, "source", &json!(source))
                    .await?;
                if orphans.matches > 0 {
                    log::warn!("  Removed {} orphaned chunk(s) for {}", orphans.successful, source);
                }
                false
            }
        };

        let chunks = self.run_pipeline(file, &source).await?;
        Ok(FileOutcome::Ingested { chunks, replaced })
    }

    /// The stored Document for `source`, if any.
    pub async fn lookup(&self, source: &str) -> Result<Option<Document>> {
        self.store
            .find_by_source(&self.collections.documents, source, Document::PROPERTIES)
            .await?
            .map(|obj| Document::from_object(&obj))
            .transpose()
    }

    /// Delete every Document and chunk recorded for `source`.
    pub async fn delete_source(&self, source: &str) -> Result<SourceDeletion> {
        delete_source(self.store.as_ref(), &self.collections, source).await
    }

    async fn run_pipeline(&self, file: &FileDescriptor, source: &str) -> Result<usize> {
        let text = self.extractor.extract(&file.path).await?;
        let pieces = self.splitter.split(&text);

        let document = Document {
            id: None,
            source: source.to_string(),
            size: file.size,
            m_time: file.modified,
            vectorized: false,
            text: Some(text),
        };
        let doc_id = self
            .store
            .create(&self.collections.documents, document.to_properties()?)
            .await?;

        for (i, piece) in pieces.iter().enumerate() {
            let chunk = DocumentChunk {
                id: None,
                text: piece.clone(),
                chunk_id: i as i64,
                source: source.to_string(),
                size: Some(file.size),
                m_time: Some(file.modified),
            };
            self.store
                .create(&self.collections.chunks, chunk.to_properties()?)
                .await?;
        }

        let mut done = Properties::new();
        done.insert("vectorized".to_string(), Value::Bool(true));
        self.store
            .patch(&self.collections.documents, doc_id, done)
            .await?;

        Ok(pieces.len())
    }
}
