//! In-memory [`ChunkStore`] implementation.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Nothing is persisted.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkRecord, Document};

use super::{ChunkFilter, ChunkStore};

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<HashMap<String, ChunkRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.docs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().unwrap_or_else(|e| e.into_inner());
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        chunks.insert(record.chunk.id.clone(), record.clone());
        Ok(())
    }

    async fn replace_chunks(&self, document_id: &str, records: &[ChunkRecord]) -> Result<()> {
        // One write guard for the whole swap.
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        chunks.retain(|_, r| r.chunk.document_id != document_id);
        for record in records {
            chunks.insert(record.chunk.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn find_chunks(&self, filter: &ChunkFilter) -> Result<Vec<ChunkRecord>> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<ChunkRecord> = chunks
            .values()
            .filter(|r| filter.matches(&r.chunk.provenance))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            (&a.chunk.document_id, a.chunk.chunk_index)
                .cmp(&(&b.chunk.document_id, b.chunk.chunk_index))
        });
        Ok(found)
    }
}
