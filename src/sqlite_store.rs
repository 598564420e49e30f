//! SQLite-backed [`Store`] implementation.
//!
//! Every [`Store::put`] runs in one transaction: replaced documents are
//! deleted, then the new document, its parents, children, and vectors are
//! inserted. A concurrent reader sees the commit or nothing of it.
//!
//! Vector search loads all vectors and scores them in Rust with cosine
//! similarity, ordered by `chunk_vectors.seq` so equal scores keep insertion
//! order.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use docshelf_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use docshelf_core::models::{
    ChildChunk, Document, DocumentSummary, IndexHit, ParentChunk, ResolvedChild, StagedDocument,
    StoreStats, StoredDocument, TocEntry,
};
use docshelf_core::store::{validate_staged, Store, VectorIndex};
use docshelf_core::{Error, Result};

/// SQLite implementation of [`Store`] and [`VectorIndex`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn storage(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

const DOCUMENT_COLUMNS: &str =
    "id, content_hash, source_path, title, content_type, ingested_at, char_count, toc_json";

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let toc_json: String = row.get("toc_json");
    let toc: Vec<TocEntry> = serde_json::from_str(&toc_json)
        .map_err(|e| Error::Storage(format!("corrupt toc_json: {}", e)))?;
    let char_count: i64 = row.get("char_count");
    Ok(Document {
        id: row.get("id"),
        content_hash: row.get("content_hash"),
        source_path: row.get("source_path"),
        title: row.get("title"),
        content_type: row.get("content_type"),
        ingested_at: row.get("ingested_at"),
        char_count: char_count as usize,
        toc,
    })
}

fn parent_from_row(row: &SqliteRow) -> ParentChunk {
    let index: i64 = row.get("chunk_index");
    let start: i64 = row.get("start_char");
    let end: i64 = row.get("end_char");
    ParentChunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        index: index as usize,
        text: row.get("text"),
        start: start as usize,
        end: end as usize,
    }
}

fn child_from_row(row: &SqliteRow) -> ChildChunk {
    let index: i64 = row.get("chunk_index");
    let start: i64 = row.get("start_char");
    let end: i64 = row.get("end_char");
    ChildChunk {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        document_id: row.get("document_id"),
        index: index as usize,
        text: row.get("text"),
        start: start as usize,
        end: end as usize,
        hash: row.get("hash"),
    }
}

/// Delete a document and all dependent rows. Returns the number of
/// document rows removed (0 or 1).
async fn delete_document_rows(conn: &mut SqliteConnection, id: &str) -> Result<u64> {
    sqlx::query(
        "DELETE FROM chunk_vectors WHERE child_id IN (SELECT id FROM child_chunks WHERE document_id = ?)",
    )
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(storage)?;

    sqlx::query("DELETE FROM child_chunks WHERE document_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;

    sqlx::query("DELETE FROM parent_chunks WHERE document_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;

    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(storage)?;

    Ok(result.rows_affected())
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn upsert(&self, child_id: &str, vector: &[f32]) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM child_chunks WHERE id = ?")
            .bind(child_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        if !exists {
            return Err(Error::not_found(format!("child chunk {}", child_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (child_id, embedding)
            VALUES (?, ?)
            ON CONFLICT(child_id) DO UPDATE SET embedding = excluded.embedding
            "#,
        )
        .bind(child_id)
        .bind(vec_to_blob(vector))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn remove(&self, child_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chunk_vectors WHERE child_id = ?")
            .bind(child_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT child_id, embedding FROM chunk_vectors ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        let mut hits: Vec<IndexHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexHit {
                    child_id: row.get("child_id"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(n as usize)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn put(&self, staged: StagedDocument, replaces: &[String]) -> Result<()> {
        validate_staged(&staged)?;
        let doc = &staged.document;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        for id in replaces {
            if delete_document_rows(&mut *tx, id).await? == 0 {
                return Err(Error::not_found(format!("document {}", id)));
            }
        }

        let holder: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE source_path = ? OR id = ?")
                .bind(&doc.source_path)
                .bind(&doc.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;
        if let Some(holder) = holder {
            return Err(Error::invalid(format!(
                "source path {} is held by document {}",
                doc.source_path, holder
            )));
        }

        let toc_json = serde_json::to_string(&doc.toc)
            .map_err(|e| Error::Storage(format!("failed to encode toc: {}", e)))?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, content_hash, source_path, title, content_type,
                                   ingested_at, char_count, toc_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.content_hash)
        .bind(&doc.source_path)
        .bind(&doc.title)
        .bind(&doc.content_type)
        .bind(doc.ingested_at)
        .bind(doc.char_count as i64)
        .bind(&toc_json)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        for p in &staged.parents {
            sqlx::query(
                r#"
                INSERT INTO parent_chunks (id, document_id, chunk_index, text, start_char, end_char)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&p.id)
            .bind(&p.document_id)
            .bind(p.index as i64)
            .bind(&p.text)
            .bind(p.start as i64)
            .bind(p.end as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        for (c, vector) in staged.children.iter().zip(&staged.vectors) {
            sqlx::query(
                r#"
                INSERT INTO child_chunks (id, parent_id, document_id, chunk_index, text,
                                          start_char, end_char, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.id)
            .bind(&c.parent_id)
            .bind(&c.document_id)
            .bind(c.index as i64)
            .bind(&c.text)
            .bind(c.start as i64)
            .bind(c.end as i64)
            .bind(&c.hash)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            sqlx::query("INSERT INTO chunk_vectors (child_id, embedding) VALUES (?, ?)")
                .bind(&c.id)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<StoredDocument> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or_else(|| Error::not_found(format!("document {}", id)))?;
        let document = document_from_row(&row)?;

        let parents = sqlx::query(
            "SELECT * FROM parent_chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(parent_from_row)
        .collect();

        let children = sqlx::query(
            r#"
            SELECT c.* FROM child_chunks c
            JOIN parent_chunks p ON p.id = c.parent_id
            WHERE c.document_id = ?
            ORDER BY p.chunk_index ASC, c.chunk_index ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .iter()
        .map(child_from_row)
        .collect();

        Ok(StoredDocument {
            document,
            parents,
            children,
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        if delete_document_rows(&mut *tx, id).await? == 0 {
            return Err(Error::not_found(format!("document {}", id)));
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY source_path ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE content_hash = ? ORDER BY source_path ASC",
            DOCUMENT_COLUMNS
        ))
        .bind(content_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn find_by_path(&self, source_path: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE source_path = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(source_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn resolve_children(&self, child_ids: &[String]) -> Result<Vec<ResolvedChild>> {
        if child_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; child_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT c.id AS child_id,
                   p.id, p.document_id, p.chunk_index, p.text, p.start_char, p.end_char,
                   d.title, d.source_path, d.content_hash, d.ingested_at
            FROM child_chunks c
            JOIN parent_chunks p ON p.id = c.parent_id
            JOIN documents d ON d.id = c.document_id
            WHERE c.id IN ({})
            "#,
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in child_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(storage)?;

        let mut by_child: HashMap<String, ResolvedChild> = rows
            .iter()
            .map(|row| {
                let parent = parent_from_row(row);
                let document = DocumentSummary {
                    id: parent.document_id.clone(),
                    title: row.get("title"),
                    source_path: row.get("source_path"),
                    content_hash: row.get("content_hash"),
                    ingested_at: row.get("ingested_at"),
                };
                let child_id: String = row.get("child_id");
                (
                    child_id.clone(),
                    ResolvedChild {
                        child_id,
                        parent,
                        document,
                    },
                )
            })
            .collect();

        Ok(child_ids
            .iter()
            .filter_map(|id| by_child.remove(id))
            .collect())
    }

    async fn update_toc(&self, id: &str, toc: &[TocEntry]) -> Result<()> {
        let toc_json = serde_json::to_string(toc)
            .map_err(|e| Error::Storage(format!("failed to encode toc: {}", e)))?;
        let result = sqlx::query("UPDATE documents SET toc_json = ? WHERE id = ?")
            .bind(&toc_json)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("document {}", id)));
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT (SELECT COUNT(*) FROM documents) AS documents,
                   (SELECT COUNT(*) FROM parent_chunks) AS parents,
                   (SELECT COUNT(*) FROM child_chunks) AS children,
                   (SELECT COUNT(*) FROM chunk_vectors) AS vectors
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        let count = |name: &str| -> usize {
            let n: i64 = row.get(name);
            n as usize
        };
        Ok(StoreStats {
            documents: count("documents"),
            parents: count("parents"),
            children: count("children"),
            index_entries: count("vectors"),
        })
    }
}
