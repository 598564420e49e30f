//! Idempotent schema migrations.
//!
//! ```text
//! documents ──< parent_chunks ──< child_chunks ──1 chunk_vectors
//! ```
//!
//! Foreign keys cascade, so deleting a document row removes every
//! dependent row. `chunk_vectors.seq` records insertion order for stable
//! tie-breaking in vector search.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        source_path TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        content_type TEXT NOT NULL DEFAULT 'text/plain',
        ingested_at INTEGER NOT NULL,
        char_count INTEGER NOT NULL,
        toc_json TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS parent_chunks (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        UNIQUE(document_id, chunk_index),
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS child_chunks (
        id TEXT PRIMARY KEY,
        parent_id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        start_char INTEGER NOT NULL,
        end_char INTEGER NOT NULL,
        hash TEXT NOT NULL,
        UNIQUE(parent_id, chunk_index),
        FOREIGN KEY (parent_id) REFERENCES parent_chunks(id) ON DELETE CASCADE,
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chunk_vectors (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        child_id TEXT NOT NULL UNIQUE,
        embedding BLOB NOT NULL,
        FOREIGN KEY (child_id) REFERENCES child_chunks(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_parent_chunks_document_id ON parent_chunks(document_id)",
    "CREATE INDEX IF NOT EXISTS idx_child_chunks_parent_id ON child_chunks(parent_id)",
    "CREATE INDEX IF NOT EXISTS idx_child_chunks_document_id ON child_chunks(document_id)",
];

/// Apply the schema to an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// `init` command: create the database file and schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}
