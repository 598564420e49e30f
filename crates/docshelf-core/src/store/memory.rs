//! In-memory [`Store`] implementation for tests and embedding in other hosts.
//!
//! All state sits behind a single `std::sync::RwLock`, so a [`Store::put`]
//! that replaces a document swaps documents, chunks, and index entries in
//! one critical section. Vector search is brute-force cosine similarity.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{
    ChildChunk, Document, IndexHit, ParentChunk, ResolvedChild, StagedDocument, StoreStats,
    StoredDocument, TocEntry,
};

use super::{validate_staged, Store, VectorIndex};

#[derive(Default)]
struct State {
    documents: HashMap<String, Document>,
    parents: HashMap<String, ParentChunk>,
    children: HashMap<String, ChildChunk>,
    /// Document id -> parent ids in order.
    doc_parents: HashMap<String, Vec<String>>,
    /// Document id -> child ids in order.
    doc_children: HashMap<String, Vec<String>>,
    /// Insertion-ordered index entries.
    vectors: Vec<(String, Vec<f32>)>,
    /// Child id -> position in `vectors`.
    positions: HashMap<String, usize>,
}

impl State {
    fn remove_document(&mut self, id: &str) -> Option<Document> {
        let doc = self.documents.remove(id)?;
        for pid in self.doc_parents.remove(id).unwrap_or_default() {
            self.parents.remove(&pid);
        }
        let child_ids: HashSet<String> = self
            .doc_children
            .remove(id)
            .unwrap_or_default()
            .into_iter()
            .collect();
        for cid in &child_ids {
            self.children.remove(cid);
        }
        self.remove_vectors(&child_ids);
        Some(doc)
    }

    fn upsert_vector(&mut self, child_id: &str, vector: &[f32]) {
        match self.positions.get(child_id) {
            Some(&pos) => self.vectors[pos].1 = vector.to_vec(),
            None => {
                self.positions.insert(child_id.to_string(), self.vectors.len());
                self.vectors.push((child_id.to_string(), vector.to_vec()));
            }
        }
    }

    /// Drop the entries for `child_ids`, keeping the rest in order.
    fn remove_vectors(&mut self, child_ids: &HashSet<String>) -> bool {
        if !child_ids.iter().any(|cid| self.positions.contains_key(cid)) {
            return false;
        }
        self.vectors.retain(|(cid, _)| !child_ids.contains(cid));
        self.positions = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, (cid, _))| (cid.clone(), pos))
            .collect();
        true
    }
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::Storage("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn upsert(&self, child_id: &str, vector: &[f32]) -> Result<()> {
        let mut state = self.write()?;
        if !state.children.contains_key(child_id) {
            return Err(Error::not_found(format!("child chunk {}", child_id)));
        }
        state.upsert_vector(child_id, vector);
        Ok(())
    }

    async fn remove(&self, child_id: &str) -> Result<bool> {
        let mut state = self.write()?;
        Ok(state.remove_vectors(&HashSet::from([child_id.to_string()])))
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let state = self.read()?;
        let mut hits: Vec<IndexHit> = state
            .vectors
            .iter()
            .map(|(cid, v)| IndexHit {
                child_id: cid.clone(),
                score: cosine_similarity(query, v),
            })
            .collect();
        // Stable sort: equal scores stay in insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read()?.vectors.len())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, staged: StagedDocument, replaces: &[String]) -> Result<()> {
        validate_staged(&staged)?;
        let mut state = self.write()?;

        if let Some(missing) = replaces.iter().find(|id| !state.documents.contains_key(*id)) {
            return Err(Error::not_found(format!("document {}", missing)));
        }
        let doc = &staged.document;
        if state.documents.contains_key(&doc.id) && !replaces.contains(&doc.id) {
            return Err(Error::invalid(format!("document id {} already exists", doc.id)));
        }
        if let Some(holder) = state
            .documents
            .values()
            .find(|d| d.source_path == doc.source_path && !replaces.contains(&d.id))
        {
            return Err(Error::invalid(format!(
                "source path {} is held by document {}",
                doc.source_path, holder.id
            )));
        }

        for id in replaces {
            state.remove_document(id);
        }

        let StagedDocument {
            document,
            parents,
            children,
            vectors,
        } = staged;
        let doc_id = document.id.clone();

        state
            .doc_parents
            .insert(doc_id.clone(), parents.iter().map(|p| p.id.clone()).collect());
        state
            .doc_children
            .insert(doc_id.clone(), children.iter().map(|c| c.id.clone()).collect());
        for p in parents {
            state.parents.insert(p.id.clone(), p);
        }
        for (c, v) in children.into_iter().zip(vectors) {
            state.upsert_vector(&c.id, &v);
            state.children.insert(c.id.clone(), c);
        }
        state.documents.insert(doc_id, document);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<StoredDocument> {
        let state = self.read()?;
        let document = state
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("document {}", id)))?;
        let parents = state
            .doc_parents
            .get(id)
            .map(|ids| ids.iter().filter_map(|pid| state.parents.get(pid).cloned()).collect())
            .unwrap_or_default();
        let children = state
            .doc_children
            .get(id)
            .map(|ids| ids.iter().filter_map(|cid| state.children.get(cid).cloned()).collect())
            .unwrap_or_default();
        Ok(StoredDocument {
            document,
            parents,
            children,
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.write()?;
        state
            .remove_document(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("document {}", id)))
    }

    async fn list_all(&self) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<Document> = state.documents.values().cloned().collect();
        docs.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        Ok(docs)
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Vec<Document>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|d| d.content_hash == content_hash)
            .collect())
    }

    async fn find_by_path(&self, source_path: &str) -> Result<Option<Document>> {
        let state = self.read()?;
        Ok(state
            .documents
            .values()
            .find(|d| d.source_path == source_path)
            .cloned())
    }

    async fn resolve_children(&self, child_ids: &[String]) -> Result<Vec<ResolvedChild>> {
        let state = self.read()?;
        let mut resolved = Vec::with_capacity(child_ids.len());
        for cid in child_ids {
            let Some(child) = state.children.get(cid) else {
                continue;
            };
            let (Some(parent), Some(doc)) = (
                state.parents.get(&child.parent_id),
                state.documents.get(&child.document_id),
            ) else {
                continue;
            };
            resolved.push(ResolvedChild {
                child_id: cid.clone(),
                parent: parent.clone(),
                document: doc.summary(),
            });
        }
        Ok(resolved)
    }

    async fn update_toc(&self, id: &str, toc: &[TocEntry]) -> Result<()> {
        let mut state = self.write()?;
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("document {}", id)))?;
        doc.toc = toc.to_vec();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.read()?;
        Ok(StoreStats {
            documents: state.documents.len(),
            parents: state.parents.len(),
            children: state.children.len(),
            index_entries: state.vectors.len(),
        })
    }
}
