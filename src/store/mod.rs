//! Vector store access for chunk records.
//!
//! The [`ChunkStore`] trait is the only way ingestion and retrieval touch
//! persisted chunks. Two backends are provided:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`memory::InMemoryStore`] | tests and one-shot runs |
//! | [`sqlite::SqliteStore`] | the CLI's on-disk database |
//!
//! Stores are upsert-only from this crate. Chunks are keyed by their stable
//! id, so re-ingesting a document overwrites rather than duplicates.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChunkRecord, DateRange, Document, DocumentType, Provenance, Query};

/// Candidate selection for a retrieval query.
///
/// An empty `document_types` list means "any type".
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub entity_ids: Vec<String>,
    pub document_types: Option<Vec<DocumentType>>,
    pub date_range: Option<DateRange>,
}

impl ChunkFilter {
    pub fn for_entities(entity_ids: Vec<String>) -> Self {
        Self {
            entity_ids,
            ..Self::default()
        }
    }

    pub fn from_query(query: &Query) -> Self {
        Self {
            entity_ids: query.entity_ids.clone(),
            document_types: query
                .document_types
                .clone()
                .filter(|types| !types.is_empty()),
            date_range: query.date_range,
        }
    }

    pub fn matches(&self, provenance: &Provenance) -> bool {
        if !self.entity_ids.iter().any(|id| *id == provenance.entity_id) {
            return false;
        }
        if let Some(types) = &self.document_types {
            if !types.is_empty() && !types.contains(&provenance.document_type) {
                return false;
            }
        }
        self.date_range
            .map_or(true, |range| range.contains(provenance.date))
    }
}

/// Storage backend for documents and their embedded chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](ChunkStore::upsert_document) | Insert or update a document |
/// | [`upsert_chunk`](ChunkStore::upsert_chunk) | Insert or update one chunk by id |
/// | [`replace_chunks`](ChunkStore::replace_chunks) | Atomically swap a document's chunk set |
/// | [`find_chunks`](ChunkStore::find_chunks) | Candidate chunks matching a filter |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    async fn upsert_chunk(&self, record: &ChunkRecord) -> Result<()>;

    /// Replace every chunk of `document_id` with `records`. Readers see
    /// either the old set or the new one, never a mix.
    async fn replace_chunks(&self, document_id: &str, records: &[ChunkRecord]) -> Result<()>;

    /// Chunks matching `filter`, ordered by document id then chunk index.
    async fn find_chunks(&self, filter: &ChunkFilter) -> Result<Vec<ChunkRecord>>;
}
