//! Storage abstraction for docshelf.
//!
//! Two traits split the persistence surface:
//!
//! * [`VectorIndex`] holds `(child id -> vector)` entries and answers
//!   nearest-neighbour queries.
//! * [`Store`] extends it with documents, parent chunks, and child chunks,
//!   and owns the atomic commit that keeps all four in step.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! in-memory backend lives in [`memory`]; the SQLite backend lives in the
//! `docshelf` app crate.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Document, IndexHit, ResolvedChild, StagedDocument, StoreStats, StoredDocument, TocEntry};

/// Searchable `(child id -> vector)` index.
///
/// # Ordering
///
/// [`search`](VectorIndex::search) returns hits by descending similarity.
/// Equal scores keep insertion order; upserting an id that is already
/// present replaces its vector but keeps its original position.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector for an existing child chunk.
    ///
    /// Fails with [`Error::NotFound`](crate::Error::NotFound) when the child
    /// is unknown to the backing store.
    async fn upsert(&self, child_id: &str, vector: &[f32]) -> Result<()>;

    /// Remove the entry for `child_id`. Returns `false` if there was none.
    async fn remove(&self, child_id: &str) -> Result<bool>;

    /// The `k` entries most similar to `query`.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Number of index entries.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Abstract content store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](Store::put) | Commit a staged document, optionally replacing others |
/// | [`get`](Store::get) | Document with all parents and children |
/// | [`delete`](Store::delete) | Remove a document and every dependent row |
/// | [`list_all`](Store::list_all) | All documents, ordered by source path |
/// | [`find_by_hash`](Store::find_by_hash) | Documents with a content hash |
/// | [`find_by_path`](Store::find_by_path) | Document at a normalised path |
/// | [`resolve_children`](Store::resolve_children) | Child ids to parents and documents |
/// | [`update_toc`](Store::update_toc) | Replace a document's cached TOC |
/// | [`stats`](Store::stats) | Row counts |
#[async_trait]
pub trait Store: VectorIndex {
    /// Commit `staged` and its index entries in one atomic step.
    ///
    /// Every id in `replaces` is deleted, with its dependents, in the same
    /// commit. Readers observe either the state before or the state after,
    /// never a mixture.
    ///
    /// Fails with `InvalidArgument` when `vectors` and `children` differ in
    /// length or when the source path is held by a document not listed in
    /// `replaces`, and with `NotFound` when a listed replacement is unknown.
    async fn put(&self, staged: StagedDocument, replaces: &[String]) -> Result<()>;

    async fn get(&self, id: &str) -> Result<StoredDocument>;

    /// Delete a document, its parents, children, and index entries.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn list_all(&self) -> Result<Vec<Document>>;

    async fn find_by_hash(&self, content_hash: &str) -> Result<Vec<Document>>;

    async fn find_by_path(&self, source_path: &str) -> Result<Option<Document>>;

    /// Resolve child ids to their parent chunk and document summary.
    ///
    /// Output follows input order. Ids that no longer exist (deleted between
    /// search and resolution) are skipped.
    async fn resolve_children(&self, child_ids: &[String]) -> Result<Vec<ResolvedChild>>;

    async fn update_toc(&self, id: &str, toc: &[TocEntry]) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Shared validation for [`Store::put`] implementations.
pub fn validate_staged(staged: &StagedDocument) -> Result<()> {
    use crate::error::Error;

    if staged.vectors.len() != staged.children.len() {
        return Err(Error::invalid(format!(
            "{} vectors for {} children of {}",
            staged.vectors.len(),
            staged.children.len(),
            staged.document.source_path
        )));
    }
    if staged.parents.is_empty() {
        return Err(Error::invalid(format!(
            "document {} has no parent chunks",
            staged.document.source_path
        )));
    }
    let doc_id = &staged.document.id;
    if let Some(p) = staged.parents.iter().find(|p| &p.document_id != doc_id) {
        return Err(Error::invalid(format!("parent {} belongs to another document", p.id)));
    }
    if let Some(c) = staged
        .children
        .iter()
        .find(|c| &c.document_id != doc_id || !staged.parents.iter().any(|p| p.id == c.parent_id))
    {
        return Err(Error::invalid(format!("child {} has no parent in this document", c.id)));
    }
    Ok(())
}
