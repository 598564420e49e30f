//! Ingestion orchestration and catalog maintenance over a [`Store`].
//!
//! # Ingest pipeline
//!
//! ```text
//! normalise text ─► hash ─► lock(hash, path + replaced docs) ─► dedup check
//!     ─► chunk ─► embed every child ─► TOC ─► one atomic put
//! ```
//!
//! Nothing is written until the final `put`, so a failure at any step
//! leaves the store exactly as it was.
//!
//! # Deduplication
//!
//! | Existing state | Without `force` | With `force` |
//! |----------------|-----------------|--------------|
//! | Same content hash | [`IngestOutcome::Duplicate`], no-op | Replaced |
//! | Same path, different hash | Replaced | Replaced |
//! | Neither | Ingested | Ingested |

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use docshelf_core::chunk::{split_document, ChunkParams};
use docshelf_core::embedding::EmbeddingProvider;
use docshelf_core::models::{Document, StagedDocument, StoreStats, StoredDocument, TocEntry};
use docshelf_core::path::{content_hash, file_name, normalize_source_path, normalize_text};
use docshelf_core::store::Store;
use docshelf_core::{Error, Result};

use crate::config::Config;
use crate::extract::{Extracted, MIME_PDF};
use crate::locks::{KeyGuard, KeyedLocks};
use crate::sqlite_store::SqliteStore;
use crate::toc::{self, HeadingTier, OutlineTier, TocChain, TocSource};

/// Minimum length of an id prefix accepted by [`Library::resolve`].
pub const MIN_ID_PREFIX: usize = 4;

/// One document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub source_path: String,
    pub title: String,
    pub content_type: String,
    pub text: String,
    /// Original bytes, for the PDF outline tier.
    pub raw: Option<Vec<u8>>,
    /// Replace an existing document with the same content hash.
    pub force: bool,
}

impl IngestRequest {
    pub fn from_extracted(path: &Path, extracted: Extracted, force: bool) -> Self {
        Self {
            source_path: path.to_string_lossy().into_owned(),
            title: extracted.title,
            content_type: extracted.content_type.to_string(),
            text: extracted.text,
            raw: extracted.raw,
            force,
        }
    }

    /// A plain-text request, titled by [`crate::extract::title_for`].
    pub fn text(source_path: &str, text: &str) -> Self {
        Self {
            source_path: source_path.to_string(),
            title: crate::extract::title_for(text, Path::new(source_path)),
            content_type: crate::extract::MIME_MARKDOWN.to_string(),
            text: text.to_string(),
            raw: None,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Ingested { id: String },
    /// Committed, and the listed documents were removed in the same commit.
    Replaced { id: String, replaced: Vec<String> },
    /// Content already stored; nothing was written.
    Duplicate { existing_id: String },
}

impl IngestOutcome {
    /// Id of the document now holding the content.
    pub fn id(&self) -> &str {
        match self {
            IngestOutcome::Ingested { id } | IngestOutcome::Replaced { id, .. } => id,
            IngestOutcome::Duplicate { existing_id } => existing_id,
        }
    }
}

/// Why documents were grouped by [`Library::duplicate_groups`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    ContentHash,
    FileName,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub kind: DuplicateKind,
    pub key: String,
    pub documents: Vec<Document>,
}

/// The local document library.
pub struct Library<S: Store + ?Sized> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingProvider>,
    params: ChunkParams,
    locks: KeyedLocks,
    toc_chain: Arc<TocChain>,
}

impl<S: Store + ?Sized> Library<S> {
    /// A library with the outline and heading TOC tiers.
    pub fn new(store: Arc<S>, embedder: Arc<dyn EmbeddingProvider>, params: ChunkParams) -> Self {
        let toc_chain = TocChain::new()
            .push(Box::new(OutlineTier))
            .push(Box::new(HeadingTier));
        Self {
            store,
            embedder,
            params,
            locks: KeyedLocks::new(),
            toc_chain: Arc::new(toc_chain),
        }
    }

    pub fn with_toc_chain(mut self, chain: TocChain) -> Self {
        self.toc_chain = Arc::new(chain);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// Ingest one document, all or nothing.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let text = normalize_text(&request.text);
        if text.trim().is_empty() {
            return Err(Error::Chunking(format!(
                "{} has no text content",
                request.source_path
            )));
        }
        let hash = content_hash(&text);
        let source_path = normalize_source_path(&request.source_path);

        // Keys of every document this ingest would replace are held too;
        // rerun the lookup until it finds nothing outside the held set.
        let mut keys: BTreeSet<String> = document_keys(&hash, &source_path).into();
        let (_guard, same_hash, at_path) = loop {
            let guard = self.locks.acquire(keys.iter().cloned()).await;
            let same_hash = self.store.find_by_hash(&hash).await?;
            let at_path = self.store.find_by_path(&source_path).await?;

            let mut needed = keys.clone();
            for doc in same_hash.iter().chain(at_path.as_ref()) {
                needed.extend(document_keys(&doc.content_hash, &doc.source_path));
            }
            if needed == keys {
                break (guard, same_hash, at_path);
            }
            drop(guard);
            keys = needed;
        };

        if let Some(existing) = same_hash.first() {
            if !request.force {
                debug!(path = %source_path, existing = %existing.id, "duplicate content, skipping");
                return Ok(IngestOutcome::Duplicate {
                    existing_id: existing.id.clone(),
                });
            }
        }

        let mut replaces: Vec<String> = same_hash.into_iter().map(|d| d.id).collect();
        if let Some(doc) = at_path {
            if !replaces.contains(&doc.id) {
                replaces.push(doc.id);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (parents, children) = split_document(&id, &text, &self.params)?;

        let texts: Vec<String> = children.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != children.len() {
            return Err(Error::IndexUnavailable(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                children.len()
            )));
        }

        let source = TocSource {
            text: text.clone(),
            content_type: request.content_type.clone(),
            raw: request.raw,
        };
        let (toc, toc_tier) = toc::extract(&self.toc_chain, &source).await;

        let document = Document {
            id: id.clone(),
            content_hash: hash,
            source_path: source_path.clone(),
            title: request.title,
            content_type: request.content_type,
            ingested_at: chrono::Utc::now().timestamp(),
            char_count: text.chars().count(),
            toc,
        };
        let parent_count = parents.len();
        let child_count = children.len();
        let staged = StagedDocument {
            document,
            parents,
            children,
            vectors,
        };
        self.store.put(staged, &replaces).await?;

        info!(
            id = %id,
            path = %source_path,
            parents = parent_count,
            children = child_count,
            toc_tier = toc_tier.as_deref().unwrap_or("none"),
            replaced = replaces.len(),
            "ingested"
        );

        Ok(if replaces.is_empty() {
            IngestOutcome::Ingested { id }
        } else {
            IngestOutcome::Replaced {
                id,
                replaced: replaces,
            }
        })
    }

    /// Delete a document with its chunks and index entries.
    pub async fn delete(&self, id: &str) -> Result<Document> {
        let document = self.store.get(id).await?.document;
        let _guard = self
            .lock_document(&document.content_hash, &document.source_path)
            .await;
        self.store.delete(id).await?;
        info!(id = %id, path = %document.source_path, "deleted");
        Ok(document)
    }

    pub async fn get(&self, id: &str) -> Result<StoredDocument> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Document>> {
        self.store.list_all().await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    /// Find a document by id, unique id prefix, source path, file name, or
    /// title, in that order.
    ///
    /// Zero matches fail with `NotFound`; several matches at the first
    /// level that has any fail with `InvalidArgument` naming the candidates.
    pub async fn resolve(&self, name: &str) -> Result<Document> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("document name is empty"));
        }
        let documents = self.store.list_all().await?;
        let path = normalize_source_path(name);

        for level in 0..RESOLVE_LEVELS {
            let found: Vec<&Document> = documents
                .iter()
                .filter(|d| name_matches(level, d, name, &path))
                .collect();
            match found.as_slice() {
                [] => continue,
                [doc] => return Ok((*doc).clone()),
                many => {
                    let candidates: Vec<String> = many
                        .iter()
                        .map(|d| format!("{} ({})", d.source_path, short_id(&d.id)))
                        .collect();
                    return Err(Error::invalid(format!(
                        "'{}' is ambiguous, candidates: {}",
                        name,
                        candidates.join(", ")
                    )));
                }
            }
        }
        Err(Error::not_found(format!("no document matches '{}'", name)))
    }

    /// Recompute and store a document's table of contents.
    ///
    /// PDFs are re-read from their source path when it still exists so the
    /// outline tier can run.
    pub async fn refresh_toc(&self, id: &str) -> Result<(Vec<TocEntry>, Option<String>)> {
        let current = self.store.get(id).await?.document;
        let _guard = self
            .lock_document(&current.content_hash, &current.source_path)
            .await;
        // Re-read under the lock: a replace may have landed in between.
        let stored = self.store.get(id).await?;
        let document = &stored.document;
        let text: String = stored.parents.iter().map(|p| p.text.as_str()).collect();
        let raw = if document.content_type == MIME_PDF {
            tokio::fs::read(&document.source_path).await.ok()
        } else {
            None
        };
        let source = TocSource {
            text,
            content_type: document.content_type.clone(),
            raw,
        };
        let (toc, tier) = toc::extract(&self.toc_chain, &source).await;
        self.store.update_toc(id, &toc).await?;
        info!(id = %id, entries = toc.len(), tier = tier.as_deref().unwrap_or("none"), "toc refreshed");
        Ok((toc, tier))
    }

    /// Re-embed every child chunk with the current provider.
    ///
    /// Each document is embedded in full before any of its index entries
    /// change. Returns the number of entries rewritten.
    pub async fn reindex(&self) -> Result<usize> {
        let mut total = 0;
        for document in self.store.list_all().await? {
            let _guard = self
                .lock_document(&document.content_hash, &document.source_path)
                .await;
            let stored = match self.store.get(&document.id).await {
                Ok(stored) => stored,
                // Deleted since the listing.
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let texts: Vec<String> = stored.children.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != stored.children.len() {
                return Err(Error::IndexUnavailable(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    stored.children.len()
                )));
            }
            for (child, vector) in stored.children.iter().zip(&vectors) {
                self.store.upsert(&child.id, vector).await?;
            }
            debug!(id = %document.id, entries = vectors.len(), "reindexed");
            total += vectors.len();
        }
        info!(entries = total, model = self.embedder.model_name(), "reindex complete");
        Ok(total)
    }

    /// Groups of documents sharing a content hash and, with `by_name`,
    /// groups sharing a file name across different paths.
    pub async fn duplicate_groups(&self, by_name: bool) -> Result<Vec<DuplicateGroup>> {
        let documents = self.store.list_all().await?;

        let mut by_hash: BTreeMap<&str, Vec<&Document>> = BTreeMap::new();
        for doc in &documents {
            by_hash.entry(&doc.content_hash).or_default().push(doc);
        }
        let mut groups: Vec<DuplicateGroup> = by_hash
            .into_iter()
            .filter(|(_, docs)| docs.len() > 1)
            .map(|(key, docs)| DuplicateGroup {
                kind: DuplicateKind::ContentHash,
                key: key.to_string(),
                documents: docs.into_iter().cloned().collect(),
            })
            .collect();

        if by_name {
            let mut names: BTreeMap<&str, Vec<&Document>> = BTreeMap::new();
            for doc in &documents {
                names.entry(file_name(&doc.source_path)).or_default().push(doc);
            }
            groups.extend(
                names
                    .into_iter()
                    .filter(|(_, docs)| docs.len() > 1)
                    .map(|(key, docs)| DuplicateGroup {
                        kind: DuplicateKind::FileName,
                        key: key.to_string(),
                        documents: docs.into_iter().cloned().collect(),
                    }),
            );
        }
        Ok(groups)
    }

    async fn lock_document(&self, hash: &str, source_path: &str) -> KeyGuard {
        self.locks.acquire(document_keys(hash, source_path)).await
    }
}

fn document_keys(hash: &str, source_path: &str) -> [String; 2] {
    [format!("hash:{}", hash), format!("path:{}", source_path)]
}

const RESOLVE_LEVELS: usize = 5;

fn name_matches(level: usize, doc: &Document, name: &str, path: &str) -> bool {
    match level {
        0 => doc.id == name,
        1 => name.len() >= MIN_ID_PREFIX && doc.id.starts_with(name),
        2 => doc.source_path == path,
        3 => file_name(&doc.source_path) == name,
        _ => doc.title == name,
    }
}

/// Open the SQLite-backed library described by `config`.
pub async fn open_library(config: &Config) -> anyhow::Result<Library<SqliteStore>> {
    let store = crate::db::open_store(config).await?;
    let embedder = crate::embedding::create_provider(&config.embedding)?;
    let toc_chain = crate::toc::build_chain(config)?;
    Ok(Library::new(Arc::new(store), embedder, config.chunking.params()).with_toc_chain(toc_chain))
}

/// First eight characters of an id, for display.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshelf_core::embedding::HashEmbedder;
    use docshelf_core::store::memory::InMemoryStore;
    use docshelf_core::store::VectorIndex;

    fn library() -> Library<InMemoryStore> {
        Library::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::new(64)),
            ChunkParams {
                parent_chars: 200,
                child_chars: 50,
            },
        )
    }

    #[tokio::test]
    async fn test_ingest_then_duplicate() {
        let lib = library();
        let first = lib
            .ingest(IngestRequest::text("notes/a.md", "# Alpha\n\nsome text"))
            .await
            .unwrap();
        assert!(matches!(first, IngestOutcome::Ingested { .. }));

        let again = lib
            .ingest(IngestRequest::text("notes/a.md", "# Alpha\r\n\r\nsome text"))
            .await
            .unwrap();
        assert_eq!(
            again,
            IngestOutcome::Duplicate {
                existing_id: first.id().to_string()
            }
        );
        assert_eq!(lib.stats().await.unwrap().documents, 1);
    }

    #[tokio::test]
    async fn test_force_replaces_same_hash() {
        let lib = library();
        let first = lib.ingest(IngestRequest::text("a.md", "same words")).await.unwrap();
        let forced = lib
            .ingest(IngestRequest::text("./a.md", "same words").forced())
            .await
            .unwrap();
        match &forced {
            IngestOutcome::Replaced { replaced, .. } => assert_eq!(replaced, &vec![first.id().to_string()]),
            other => panic!("expected Replaced, got {:?}", other),
        }
        let docs = lib.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, forced.id());
    }

    #[tokio::test]
    async fn test_same_path_new_content_replaces() {
        let lib = library();
        lib.ingest(IngestRequest::text("a.md", "version one")).await.unwrap();
        let second = lib.ingest(IngestRequest::text("a.md", "version two")).await.unwrap();
        assert!(matches!(second, IngestOutcome::Replaced { .. }));
        let docs = lib.list().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content_hash, content_hash("version two"));
    }

    #[tokio::test]
    async fn test_empty_text_is_chunking_error() {
        let lib = library();
        let err = lib.ingest(IngestRequest::text("e.md", " \n ")).await.unwrap_err();
        assert!(matches!(err, Error::Chunking(_)));
        assert_eq!(lib.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_delete_removes_index_entries() {
        let lib = library();
        let out = lib
            .ingest(IngestRequest::text("d.md", &"word ".repeat(120)))
            .await
            .unwrap();
        assert!(lib.store().len().await.unwrap() > 0);
        lib.delete(out.id()).await.unwrap();
        assert_eq!(lib.store().len().await.unwrap(), 0);
        assert!(matches!(lib.delete(out.id()).await, Err(Error::NotFound(_))));
        assert_eq!(lib.locks().tracked(), 0);
    }

    #[tokio::test]
    async fn test_resolve_levels() {
        let lib = library();
        let a = lib.ingest(IngestRequest::text("/docs/guide.md", "# Guide\n\nA")).await.unwrap();
        lib.ingest(IngestRequest::text("/other/guide.md", "# Other\n\nB")).await.unwrap();

        assert_eq!(lib.resolve(a.id()).await.unwrap().id, a.id());
        assert_eq!(lib.resolve(&a.id()[..8]).await.unwrap().id, a.id());
        assert_eq!(lib.resolve("/docs//guide.md").await.unwrap().id, a.id());
        assert_eq!(lib.resolve("Guide").await.unwrap().id, a.id());
        assert!(matches!(lib.resolve("guide.md").await, Err(Error::InvalidArgument(_))));
        assert!(matches!(lib.resolve("missing").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_groups_by_name() {
        let lib = library();
        lib.ingest(IngestRequest::text("/x/readme.md", "one")).await.unwrap();
        lib.ingest(IngestRequest::text("/y/readme.md", "two")).await.unwrap();

        assert!(lib.duplicate_groups(false).await.unwrap().is_empty());
        let groups = lib.duplicate_groups(true).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind, DuplicateKind::FileName);
        assert_eq!(groups[0].documents.len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_and_reindex() {
        let lib = library();
        let out = lib
            .ingest(IngestRequest::text("t.md", "# Top\n\n## Sub\n\nbody text"))
            .await
            .unwrap();
        let (toc, tier) = lib.refresh_toc(out.id()).await.unwrap();
        assert_eq!(toc.len(), 2);
        assert_eq!(tier.as_deref(), Some("headings"));

        let entries = lib.store().len().await.unwrap();
        assert_eq!(lib.reindex().await.unwrap(), entries);
        assert_eq!(lib.store().len().await.unwrap(), entries);
    }
}
