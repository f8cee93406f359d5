//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Chunks are stored denormalized with their provenance (entity, document
//! type, date, source) so candidate selection is a single indexed scan of
//! the `chunks` table. Dates are `YYYY-MM-DD` text, which orders correctly
//! under string comparison.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkRecord, Document, DocumentType, Provenance, Span};

use super::{ChunkFilter, ChunkStore};

const DATE_FORMAT: &str = "%Y-%m-%d";

const CHUNK_COLUMNS: &str = "id, document_id, entity_id, chunk_index, text, hash, span_start, \
     span_end, embedding, document_type, source_url, source_title, date";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

async fn write_chunk(conn: &mut SqliteConnection, record: &ChunkRecord) -> Result<()> {
    let chunk = &record.chunk;
    let prov = &chunk.provenance;

    sqlx::query(
        r#"
        INSERT INTO chunks (id, document_id, entity_id, chunk_index, text, hash,
                            span_start, span_end, embedding, document_type,
                            source_url, source_title, date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            document_id = excluded.document_id,
            entity_id = excluded.entity_id,
            chunk_index = excluded.chunk_index,
            text = excluded.text,
            hash = excluded.hash,
            span_start = excluded.span_start,
            span_end = excluded.span_end,
            embedding = excluded.embedding,
            document_type = excluded.document_type,
            source_url = excluded.source_url,
            source_title = excluded.source_title,
            date = excluded.date
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(&prov.entity_id)
    .bind(chunk.chunk_index)
    .bind(&chunk.text)
    .bind(&chunk.hash)
    .bind(chunk.span.start as i64)
    .bind(chunk.span.end as i64)
    .bind(&record.embedding)
    .bind(prov.document_type.as_str())
    .bind(&prov.source_url)
    .bind(&prov.source_title)
    .bind(format_date(prov.date))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Decode one `chunks` row. Unknown document types and unparseable dates
/// are reported as [`Error::MalformedChunk`].
fn decode_chunk(row: &SqliteRow) -> Result<ChunkRecord> {
    let id: String = row.try_get("id")?;

    let type_tag: String = row.try_get("document_type")?;
    let document_type: DocumentType = type_tag
        .parse()
        .map_err(|e: String| Error::malformed(&id, e))?;

    let date = row
        .try_get::<Option<String>, _>("date")?
        .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
        .transpose()
        .map_err(|e| Error::malformed(&id, format!("bad date: {}", e)))?;

    let span_start: i64 = row.try_get("span_start")?;
    let span_end: i64 = row.try_get("span_end")?;

    Ok(ChunkRecord {
        chunk: Chunk {
            document_id: row.try_get("document_id")?,
            chunk_index: row.try_get("chunk_index")?,
            text: row.try_get("text")?,
            hash: row.try_get("hash")?,
            span: Span::new(span_start.max(0) as usize, span_end.max(0) as usize),
            provenance: Provenance {
                entity_id: row.try_get("entity_id")?,
                document_type,
                source_url: row.try_get("source_url")?,
                source_title: row.try_get("source_title")?,
                date,
            },
            id,
        },
        embedding: row.try_get("embedding")?,
    })
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, entity_id, document_type, title, source_url,
                                   date, body, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                entity_id = excluded.entity_id,
                document_type = excluded.document_type,
                title = excluded.title,
                source_url = excluded.source_url,
                date = excluded.date,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.entity_id)
        .bind(doc.document_type.as_str())
        .bind(&doc.title)
        .bind(&doc.source_url)
        .bind(format_date(doc.date))
        .bind(&doc.body)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        write_chunk(&mut conn, record).await
    }

    async fn replace_chunks(&self, document_id: &str, records: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for record in records {
            write_chunk(&mut tx, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_chunks(&self, filter: &ChunkFilter) -> Result<Vec<ChunkRecord>> {
        if filter.entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM chunks WHERE entity_id IN (", CHUNK_COLUMNS));
        let mut ids = builder.separated(", ");
        for id in &filter.entity_ids {
            ids.push_bind(id);
        }
        ids.push_unseparated(")");

        if let Some(types) = filter.document_types.as_ref().filter(|t| !t.is_empty()) {
            builder.push(" AND document_type IN (");
            let mut tags = builder.separated(", ");
            for t in types {
                tags.push_bind(t.as_str());
            }
            tags.push_unseparated(")");
        }

        if let Some(range) = &filter.date_range {
            if range.from.is_some() || range.to.is_some() {
                builder.push(" AND date IS NOT NULL");
            }
            if let Some(from) = range.from {
                builder.push(" AND date >= ");
                builder.push_bind(from.format(DATE_FORMAT).to_string());
            }
            if let Some(to) = range.to {
                builder.push(" AND date <= ");
                builder.push_bind(to.format(DATE_FORMAT).to_string());
            }
        }

        builder.push(" ORDER BY document_id ASC, chunk_index ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_chunk(row) {
                Ok(record) => records.push(record),
                Err(e @ Error::MalformedChunk { .. }) => {
                    tracing::warn!(error = %e, "skipping unreadable chunk row");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use crate::models::DateRange;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(doc: &str, index: i64, entity: &str, doc_type: DocumentType, date: Option<&str>) -> ChunkRecord {
        ChunkRecord {
            chunk: Chunk {
                id: format!("{}-{}", doc, index),
                document_id: doc.to_string(),
                chunk_index: index,
                text: format!("chunk {} of {}", index, doc),
                span: Span::new(index as usize * 10, index as usize * 10 + 9),
                hash: "h".to_string(),
                provenance: Provenance {
                    entity_id: entity.to_string(),
                    document_type: doc_type,
                    source_url: format!("https://example.gov/{}", doc),
                    source_title: Some(format!("Title {}", doc)),
                    date: date.map(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).unwrap()),
                },
            },
            embedding: "0.5,0.25".to_string(),
        }
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_provenance() {
        let store = memory_store().await;
        let original = record("d1", 3, "A", DocumentType::CommitteeTranscript, Some("2024-02-29"));
        store.upsert_chunk(&original).await.unwrap();

        let found = store
            .find_chunks(&ChunkFilter::for_entities(vec!["A".into()]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let got = &found[0].chunk;
        assert_eq!(got.id, "d1-3");
        assert_eq!(got.span, Span::new(30, 39));
        assert_eq!(got.provenance, original.chunk.provenance);
        assert_eq!(found[0].embedding, "0.5,0.25");
    }

    #[tokio::test]
    async fn test_replace_chunks_is_total() {
        let store = memory_store().await;
        let three: Vec<ChunkRecord> = (0..3)
            .map(|i| record("d1", i, "A", DocumentType::Other, None))
            .collect();
        store.replace_chunks("d1", &three).await.unwrap();
        store
            .replace_chunks("d1", &[record("d1", 0, "A", DocumentType::Other, None)])
            .await
            .unwrap();

        let found = store
            .find_chunks(&ChunkFilter::for_entities(vec!["A".into()]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_filters_by_type_and_date() {
        let store = memory_store().await;
        for r in [
            record("d1", 0, "A", DocumentType::VotingRecord, Some("2024-01-10")),
            record("d2", 0, "A", DocumentType::PressRelease, Some("2024-01-10")),
            record("d3", 0, "A", DocumentType::VotingRecord, Some("2023-05-01")),
            record("d4", 0, "A", DocumentType::VotingRecord, None),
            record("d5", 0, "B", DocumentType::VotingRecord, Some("2024-01-10")),
        ] {
            store.upsert_chunk(&r).await.unwrap();
        }

        let filter = ChunkFilter {
            entity_ids: vec!["A".into()],
            document_types: Some(vec![DocumentType::VotingRecord]),
            date_range: Some(DateRange {
                from: NaiveDate::from_ymd_opt(2024, 1, 1),
                to: None,
            }),
        };
        let found = store.find_chunks(&filter).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["d1-0"]);

        let all_a = store
            .find_chunks(&ChunkFilter::for_entities(vec!["A".into()]))
            .await
            .unwrap();
        assert_eq!(all_a.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_type_row_is_skipped() {
        let store = memory_store().await;
        store
            .upsert_chunk(&record("d1", 0, "A", DocumentType::Other, None))
            .await
            .unwrap();
        sqlx::query("UPDATE chunks SET document_type = 'memo' WHERE id = 'd1-0'")
            .execute(store.pool())
            .await
            .unwrap();
        store
            .upsert_chunk(&record("d2", 0, "A", DocumentType::Other, None))
            .await
            .unwrap();

        let found = store
            .find_chunks(&ChunkFilter::for_entities(vec!["A".into()]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chunk.id, "d2-0");
    }
}
