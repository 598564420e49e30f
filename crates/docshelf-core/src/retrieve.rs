//! Query-time retrieval: child search, parent collapse, ranking.
//!
//! # Algorithm
//!
//! 1. Embed the query text.
//! 2. Search the index for `top_k × overfetch` nearest children.
//! 3. Resolve each child to its parent; keep the maximum child score per
//!    parent.
//! 4. Sort parents by collapsed score (desc); equal scores keep the order in
//!    which the parent was first reached. Truncate to `top_k`.
//! 5. Attach source document metadata.
//!
//! The overfetch factor compensates for several children collapsing onto
//! one parent.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{HitSource, RetrievalHit, RetrievalResult};
use crate::store::Store;

/// Default multiplier applied to `top_k` before parent collapsing.
pub const DEFAULT_OVERFETCH: usize = 3;

/// Finds the parent chunks most relevant to a query.
pub struct Retriever<S: Store + ?Sized> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingProvider>,
    overfetch: usize,
}

impl<S: Store + ?Sized> Clone for Retriever<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
            overfetch: self.overfetch,
        }
    }
}

impl<S: Store + ?Sized> Retriever<S> {
    pub fn new(store: Arc<S>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            overfetch: DEFAULT_OVERFETCH,
        }
    }

    /// Override the overfetch factor. Values below 1 are treated as 1.
    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    pub fn overfetch(&self) -> usize {
        self.overfetch
    }

    /// Retrieve at most `top_k` distinct parents for `query`.
    ///
    /// An empty index or a blank query yields an empty result. `top_k == 0`
    /// fails with [`Error::InvalidArgument`]; embedding failures surface as
    /// [`Error::IndexUnavailable`].
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        if top_k == 0 {
            return Err(Error::invalid("top_k must be at least 1"));
        }
        if query.trim().is_empty() || self.store.is_empty().await? {
            return Ok(RetrievalResult::default());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let fetch = top_k.saturating_mul(self.overfetch);
        let index_hits = self.store.search(&query_vec, fetch).await?;

        let scores: HashMap<&str, f32> = index_hits
            .iter()
            .map(|h| (h.child_id.as_str(), h.score))
            .collect();
        let child_ids: Vec<String> = index_hits.iter().map(|h| h.child_id.clone()).collect();
        let resolved = self.store.resolve_children(&child_ids).await?;

        // parent id -> position in `collapsed`
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut collapsed: Vec<RetrievalHit> = Vec::new();
        for rc in resolved {
            let score = f64::from(scores.get(rc.child_id.as_str()).copied().unwrap_or(0.0));
            match seen.get(&rc.parent.id) {
                Some(&pos) => {
                    if score > collapsed[pos].score {
                        collapsed[pos].score = score;
                    }
                }
                None => {
                    seen.insert(rc.parent.id.clone(), collapsed.len());
                    collapsed.push(RetrievalHit {
                        score,
                        source: HitSource::Local {
                            parent: rc.parent,
                            document: rc.document,
                        },
                    });
                }
            }
        }

        collapsed.sort_by(|a, b| b.score.total_cmp(&a.score));
        collapsed.truncate(top_k);

        debug!(
            query,
            fetched = index_hits.len(),
            parents = collapsed.len(),
            "retrieved"
        );
        Ok(RetrievalResult { hits: collapsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{split_document, ChunkParams};
    use crate::embedding::HashEmbedder;
    use crate::models::{Document, StagedDocument};
    use crate::path::content_hash;
    use crate::store::VectorIndex;
    use crate::store::memory::InMemoryStore;
    use std::collections::HashSet;

    async fn ingest(store: &InMemoryStore, embedder: &HashEmbedder, path: &str, text: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let params = ChunkParams {
            parent_chars: 120,
            child_chars: 40,
        };
        let (parents, children) = split_document(&id, text, &params).unwrap();
        let vectors = children.iter().map(|c| embedder.embed_text(&c.text)).collect();
        let staged = StagedDocument {
            document: Document {
                id: id.clone(),
                content_hash: content_hash(text),
                source_path: path.to_string(),
                title: path.to_string(),
                content_type: "text/plain".to_string(),
                ingested_at: 0,
                char_count: text.chars().count(),
                toc: Vec::new(),
            },
            parents,
            children,
            vectors,
        };
        store.put(staged, &[]).await.unwrap();
        id
    }

    fn setup() -> (Arc<InMemoryStore>, Arc<HashEmbedder>) {
        (Arc::new(InMemoryStore::new()), Arc::new(HashEmbedder::default()))
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let (store, embedder) = setup();
        let r = Retriever::new(store, embedder);
        assert!(r.retrieve("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_top_k_is_invalid() {
        let (store, embedder) = setup();
        let r = Retriever::new(store, embedder);
        assert!(matches!(r.retrieve("q", 0).await, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_blank_query_returns_empty() {
        let (store, embedder) = setup();
        ingest(&store, &embedder, "/a.md", "Some content about databases.").await;
        let r = Retriever::new(store, embedder);
        assert!(r.retrieve("   ", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_bounded_distinct_and_sorted() {
        let (store, embedder) = setup();
        let text: String = (0..12)
            .map(|i| format!("Section {} covers raft consensus and leader election.\n\n", i))
            .collect();
        ingest(&store, &embedder, "/raft.md", &text).await;
        ingest(&store, &embedder, "/other.md", "Gardening tips for tomatoes and basil.").await;

        let r = Retriever::new(store, embedder);
        for k in 1..=4 {
            let result = r.retrieve("raft leader election", k).await.unwrap();
            assert!(result.len() <= k);
            let parents: HashSet<String> = result
                .hits
                .iter()
                .map(|h| match &h.source {
                    HitSource::Local { parent, .. } => parent.id.clone(),
                    HitSource::External { .. } => unreachable!(),
                })
                .collect();
            assert_eq!(parents.len(), result.len());
            assert!(result.hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn test_relevant_document_ranks_first() {
        let (store, embedder) = setup();
        ingest(&store, &embedder, "/cooking.md", "Braise the short ribs slowly with red wine.").await;
        ingest(&store, &embedder, "/rust.md", "The borrow checker enforces ownership rules in Rust.").await;

        let r = Retriever::new(store, embedder);
        let result = r.retrieve("rust borrow checker ownership", 2).await.unwrap();
        match &result.top().unwrap().source {
            HitSource::Local { document, .. } => assert_eq!(document.source_path, "/rust.md"),
            HitSource::External { .. } => panic!("unexpected external hit"),
        }
    }

    #[tokio::test]
    async fn test_collapsed_score_is_max_child_score() {
        let (store, embedder) = setup();
        ingest(
            &store,
            &embedder,
            "/one.md",
            "alpha beta gamma. delta epsilon zeta. eta theta iota.",
        )
        .await;
        let r = Retriever::new(store.clone(), embedder.clone()).with_overfetch(10);
        let result = r.retrieve("delta epsilon zeta", 1).await.unwrap();
        assert_eq!(result.len(), 1);

        let q = embedder.embed_text("delta epsilon zeta");
        let best = store.search(&q, 1).await.unwrap()[0].score;
        assert!((result.hits[0].score - f64::from(best)).abs() < 1e-9);
    }
}
