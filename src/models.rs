//! Core data models shared by ingestion, storage and retrieval.
//!
//! Documents are owned by a single entity (a public figure or committee)
//! and split into [`Chunk`]s. Each chunk carries denormalized
//! [`Provenance`] so retrieval never needs to join back to its document.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of official document a chunk was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    VotingRecord,
    BillSponsorship,
    PressRelease,
    CommitteeTranscript,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::VotingRecord,
        DocumentType::BillSponsorship,
        DocumentType::PressRelease,
        DocumentType::CommitteeTranscript,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::VotingRecord => "voting_record",
            DocumentType::BillSponsorship => "bill_sponsorship",
            DocumentType::PressRelease => "press_release",
            DocumentType::CommitteeTranscript => "committee_transcript",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown document type '{}'. Must be voting_record, bill_sponsorship, \
                     press_release, committee_transcript, or other.",
                    s
                )
            })
    }
}

/// Half-open byte range `[start, end)` into a document body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Where a chunk came from. Copied onto every chunk at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub entity_id: String,
    pub document_type: DocumentType,
    pub source_url: String,
    pub source_title: Option<String>,
    pub date: Option<NaiveDate>,
}

/// An official document to ingest.
///
/// An empty `id` is filled in from the source URL by [`Document::ensure_id`].
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: String,
    pub entity_id: String,
    pub document_type: DocumentType,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub source_url: String,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
}

impl Document {
    /// Give the document a stable id derived from its source URL if it has none.
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, self.source_url.as_bytes())
                .to_string();
        }
    }

    pub fn provenance(&self) -> Provenance {
        Provenance {
            entity_id: self.entity_id.clone(),
            document_type: self.document_type,
            source_url: self.source_url.clone(),
            source_title: self.title.clone(),
            date: self.date,
        }
    }
}

/// A bounded slice of a document's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub span: Span,
    pub hash: String,
    pub provenance: Provenance,
}

/// A chunk as persisted: its embedding is kept as comma-joined floats.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub embedding: String,
}

/// Inclusive date bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Undated chunks never match a range with at least one bound.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// A retrieval request scoped to a set of entities.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub entity_ids: Vec<String>,
    pub document_types: Option<Vec<DocumentType>>,
    pub date_range: Option<DateRange>,
    pub top_k: usize,
    pub similarity_threshold: f64,
}

impl Query {
    pub const DEFAULT_TOP_K: usize = 5;

    pub fn new(text: impl Into<String>, entity_ids: Vec<String>, similarity_threshold: f64) -> Self {
        Self {
            text: text.into(),
            entity_ids,
            document_types: None,
            date_range: None,
            top_k: Self::DEFAULT_TOP_K,
            similarity_threshold,
        }
    }
}

/// A ranked chunk handed to the context assembler.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    pub chunk_id: String,
    pub text: String,
    pub similarity: f64,
    pub provenance: Provenance,
}

/// Everything a caller needs to ground an answer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub contexts: Vec<RetrievedContext>,
    pub prompt_text: String,
    pub citations: Vec<String>,
    pub sufficient: bool,
}
