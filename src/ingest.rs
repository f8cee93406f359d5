//! Ingestion pipeline.
//!
//! document → chunks → embeddings → store. A document's chunks are only
//! written once every one of them has a valid embedding, and the new set
//! replaces the old one atomically. A failed document leaves the store as
//! it was.

use std::path::Path;

use anyhow::{Context, Result as AnyResult};

use crate::batch::BatchEmbedder;
use crate::chunk::{chunk_document, ChunkingParams};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, vector_to_string};
use crate::error::Result;
use crate::models::{ChunkRecord, Document};
use crate::store::sqlite::SqliteStore;
use crate::store::ChunkStore;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_written: usize,
    /// Dimensionality of the stored vectors; 0 when no chunk was produced.
    pub dims: usize,
}

/// Chunk, embed and store a single document.
///
/// # Errors
///
/// Any embedding failure aborts the document before anything is written.
pub async fn ingest_document(
    store: &dyn ChunkStore,
    embedder: &BatchEmbedder,
    doc: &Document,
    params: &ChunkingParams,
) -> Result<IngestReport> {
    let chunks = chunk_document(doc, params);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_all(&texts).await?;
    let dims = vectors.first().map_or(0, Vec::len);

    let records: Vec<ChunkRecord> = chunks
        .into_iter()
        .zip(vectors.iter())
        .map(|(chunk, vector)| ChunkRecord {
            chunk,
            embedding: vector_to_string(vector),
        })
        .collect();

    store.upsert_document(doc).await?;
    store.replace_chunks(&doc.id, &records).await?;

    tracing::info!(
        document = %doc.id,
        entity = %doc.entity_id,
        chunks = records.len(),
        dims,
        "ingested document"
    );

    Ok(IngestReport {
        document_id: doc.id.clone(),
        chunks_written: records.len(),
        dims,
    })
}

/// Read a JSON array of documents from disk, assigning ids where missing.
pub fn load_documents(path: &Path) -> AnyResult<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;
    let mut docs: Vec<Document> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse documents file: {}", path.display()))?;
    for doc in &mut docs {
        doc.ensure_id();
    }
    Ok(docs)
}

/// `civic ingest`: ingest every document in `path` into the configured database.
///
/// Documents are processed one at a time; a failing document is reported and
/// skipped, and the remaining documents are still ingested.
pub async fn run_ingest(config: &Config, path: &Path, dry_run: bool) -> AnyResult<()> {
    let docs = load_documents(path)?;
    let params = config.chunking.params();

    if dry_run {
        let total_chunks: usize = docs.iter().map(|d| chunk_document(d, &params).len()).sum();
        println!("ingest {} (dry-run)", path.display());
        println!("  documents found: {}", docs.len());
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let embedder =
        BatchEmbedder::from_config(create_embedder(&config.embedding)?, &config.embedding);
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let mut ingested = 0usize;
    let mut failed = 0usize;
    let mut chunks_written = 0usize;

    for doc in &docs {
        match ingest_document(&store, &embedder, doc, &params).await {
            Ok(report) => {
                ingested += 1;
                chunks_written += report.chunks_written;
            }
            Err(e) => {
                failed += 1;
                tracing::error!(document = %doc.id, error = %e, "document not ingested");
            }
        }
    }
    pool.close().await;

    println!("ingest {}", path.display());
    println!("  documents: {}", docs.len());
    println!("  ingested: {}", ingested);
    println!("  failed: {}", failed);
    println!("  chunks written: {}", chunks_written);
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::error::Error;
    use crate::models::DocumentType;
    use crate::rate_limit::Unpaced;
    use crate::store::memory::InMemoryStore;
    use crate::store::ChunkFilter;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Deterministic 4-d embedding; fails on texts containing "forbidden".
    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("forbidden") {
                return Err(Error::embedding("refused"));
            }
            let count = |c: char| text.matches(c).count() as f32;
            Ok(vec![count('a') + 1.0, count('e'), count('i'), count('o')])
        }
    }

    fn client() -> BatchEmbedder {
        BatchEmbedder::new(Arc::new(LetterEmbedder), Arc::new(Unpaced), 3)
    }

    fn doc(id: &str, body: &str) -> Document {
        Document {
            id: id.to_string(),
            entity_id: "S001".to_string(),
            document_type: DocumentType::VotingRecord,
            date: None,
            source_url: format!("https://senate.gov/{}", id),
            title: None,
            body: body.to_string(),
        }
    }

    fn params() -> ChunkingParams {
        ChunkingParams {
            max_chars: 60,
            min_chars: 10,
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_every_chunk_with_vector() {
        let store = InMemoryStore::new();
        let body = "The senator voted for the farm bill. She also opposed the amendment. \
                    A later statement explained the position in detail.";
        let report = ingest_document(&store, &client(), &doc("d1", body), &params())
            .await
            .unwrap();

        assert!(report.chunks_written >= 2);
        assert_eq!(report.dims, 4);
        assert_eq!(store.document_count(), 1);

        let stored = store
            .find_chunks(&ChunkFilter::for_entities(vec!["S001".into()]))
            .await
            .unwrap();
        assert_eq!(stored.len(), report.chunks_written);
        for r in &stored {
            assert_eq!(crate::embedding::parse_vector(&r.embedding).unwrap().len(), 4);
        }
    }

    #[tokio::test]
    async fn test_failed_embedding_writes_nothing() {
        let store = InMemoryStore::new();
        let body = "This first sentence is fine. This one mentions a forbidden topic.";
        let err = ingest_document(&store, &client(), &doc("d1", body), &params())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Embedding { .. }));
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let store = InMemoryStore::new();
        let long = "First point about taxes. Second point about roads. Third point about schools.";
        ingest_document(&store, &client(), &doc("d1", long), &params())
            .await
            .unwrap();
        let before = store.chunk_count();
        assert!(before >= 2);

        ingest_document(&store, &client(), &doc("d1", "Only one point remains now."), &params())
            .await
            .unwrap();
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn test_load_documents_assigns_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        std::fs::write(
            &path,
            r#"[{"entity_id":"S1","document_type":"other","source_url":"https://a.gov/1","body":"x"},
                {"id":"given","entity_id":"S1","document_type":"other","source_url":"https://a.gov/2","body":"y"}]"#,
        )
        .unwrap();

        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(!docs[0].id.is_empty());
        assert_eq!(docs[1].id, "given");
    }

    #[test]
    fn test_load_documents_rejects_unknown_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        std::fs::write(
            &path,
            r#"[{"entity_id":"S1","document_type":"memo","source_url":"u","body":"x"}]"#,
        )
        .unwrap();
        assert!(load_documents(&path).is_err());
    }
}
