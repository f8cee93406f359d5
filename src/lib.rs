//! # Civic Context
//!
//! Grounded source retrieval for generated answers about public figures,
//! plus cached scoring of committee activity.
//!
//! Official documents are split into sentence-aligned chunks, embedded, and
//! stored with their provenance. A query restricted to a set of entities is
//! embedded the same way, compared against the stored chunks by cosine
//! similarity, and the best matches are rendered into a prompt block with
//! numbered citations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ Document │──▶│ Chunk+Embed  │──▶│  Store   │
//! │  (JSON)  │   │ (batched)    │   │ SQLite   │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │
//!                 ┌──────────────────────┘
//!                 ▼
//!          ┌─────────────┐   ┌──────────────┐
//!          │ Similarity  │──▶│   Context    │──▶ prompt + citations
//!          │ (top-k)     │   │  Assembler   │
//!          └─────────────┘   └──────────────┘
//!
//! Activity API ──▶ TTL cache ──▶ productivity score
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! civic init
//! civic ingest documents.json
//! civic query "How did she vote on farm subsidies?" --entity S000123
//! civic score HSAG --records activity.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`chunk`] | Sentence-boundary chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`rate_limit`] | Pacing for external calls |
//! | [`batch`] | Batched, paced embedding |
//! | [`store`] | Chunk storage backends |
//! | [`similarity`] | Cosine ranking and top-k selection |
//! | [`context`] | Prompt and citation rendering |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Retrieval pipeline |
//! | [`cache`] | TTL cache for external API data |
//! | [`activity`] | Committee activity analytics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod activity;
pub mod batch;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod rate_limit;
pub mod retrieve;
pub mod similarity;
pub mod store;
