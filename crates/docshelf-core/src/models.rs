//! Core data models used throughout docshelf.
//!
//! A [`Document`] owns an ordered list of [`ParentChunk`]s that partition its
//! text. Each parent owns an ordered list of [`ChildChunk`]s that partition
//! the parent. Only children are embedded and searched; parents are what the
//! retriever hands back as context.
//!
//! All `start`/`end` offsets are character (not byte) offsets into the
//! normalised document text, half-open.

use serde::{Deserialize, Serialize};

/// One entry of a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Nesting depth, 1 = top level.
    pub level: u32,
    pub title: String,
    /// Character offset of the heading in the document text, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// 1-based page number, when the source has pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// A stored document.
///
/// Identity for deduplication is the pair (`content_hash`, `source_path`):
/// the same hash is never stored twice and each normalised path holds at
/// most one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document UUID.
    pub id: String,
    /// SHA-256 (hex) of the normalised text.
    pub content_hash: String,
    /// Normalised source path.
    pub source_path: String,
    pub title: String,
    pub content_type: String,
    /// Unix seconds.
    pub ingested_at: i64,
    /// Length of the normalised text in characters.
    pub char_count: usize,
    pub toc: Vec<TocEntry>,
}

impl Document {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            source_path: self.source_path.clone(),
            content_hash: self.content_hash.clone(),
            ingested_at: self.ingested_at,
        }
    }
}

/// Lightweight document metadata attached to retrieval hits and listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub source_path: String,
    pub content_hash: String,
    pub ingested_at: i64,
}

/// Coarse segment of a document, returned as retrieval context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChunk {
    pub id: String,
    pub document_id: String,
    /// Position within the document, contiguous from 0.
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Fine segment of a parent, the unit of vector search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildChunk {
    pub id: String,
    pub parent_id: String,
    pub document_id: String,
    /// Position within the parent, contiguous from 0.
    pub index: usize,
    pub text: String,
    /// Offsets into the document text (not the parent).
    pub start: usize,
    pub end: usize,
    /// SHA-256 (hex) of `text`.
    pub hash: String,
}

/// Everything needed to commit one document in a single atomic write.
///
/// `vectors[i]` is the embedding of `children[i]`.
#[derive(Debug, Clone)]
pub struct StagedDocument {
    pub document: Document,
    pub parents: Vec<ParentChunk>,
    pub children: Vec<ChildChunk>,
    pub vectors: Vec<Vec<f32>>,
}

/// A document with all of its chunks, as returned by [`Store::get`](crate::store::Store::get).
#[derive(Debug, Clone, Serialize)]
pub struct StoredDocument {
    pub document: Document,
    pub parents: Vec<ParentChunk>,
    pub children: Vec<ChildChunk>,
}

impl StoredDocument {
    /// Children belonging to `parent_id`, in order.
    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a ChildChunk> {
        self.children.iter().filter(move |c| c.parent_id == parent_id)
    }
}

/// One `(child id, similarity)` pair from a vector index search.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub child_id: String,
    pub score: f32,
}

/// A child chunk resolved to its parent and source document.
#[derive(Debug, Clone)]
pub struct ResolvedChild {
    pub child_id: String,
    pub parent: ParentChunk,
    pub document: DocumentSummary,
}

/// Where a retrieval hit came from.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitSource {
    /// A parent chunk from the local library.
    Local {
        parent: ParentChunk,
        document: DocumentSummary,
    },
    /// A snippet returned by an external search provider.
    External {
        title: String,
        url: String,
        snippet: String,
        provider: String,
    },
}

/// One ranked entry of a [`RetrievalResult`].
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalHit {
    pub score: f64,
    #[serde(flatten)]
    pub source: HitSource,
}

impl RetrievalHit {
    /// The context text carried by this hit.
    pub fn text(&self) -> &str {
        match &self.source {
            HitSource::Local { parent, .. } => &parent.text,
            HitSource::External { snippet, .. } => snippet,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self.source, HitSource::External { .. })
    }
}

/// Ranked retrieval context for a query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Highest-ranked hit, if any.
    pub fn top(&self) -> Option<&RetrievalHit> {
        self.hits.first()
    }
}

/// Row counts across the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub parents: usize,
    pub children: usize,
    pub index_entries: usize,
}
