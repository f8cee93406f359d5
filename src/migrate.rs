//! Database schema.
//!
//! Every statement is idempotent, so `civic init` can be re-run safely.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Connect to the configured database and create any missing tables.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = apply_schema(&pool).await;
    pool.close().await;
    result
}

/// Create tables and indexes on an existing pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            entity_id TEXT NOT NULL,
            document_type TEXT NOT NULL,
            title TEXT,
            source_url TEXT NOT NULL,
            date TEXT,
            body TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Provenance is copied onto each chunk so retrieval never joins documents.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            span_start INTEGER NOT NULL,
            span_end INTEGER NOT NULL,
            embedding TEXT NOT NULL,
            document_type TEXT NOT NULL,
            source_url TEXT NOT NULL,
            source_title TEXT,
            date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_entity_id ON chunks(entity_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id, chunk_index)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_entity_id ON documents(entity_id)")
        .execute(pool)
        .await?;

    Ok(())
}
