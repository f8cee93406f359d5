//! Retrieval pipeline.
//!
//! ```text
//! Query ──▶ validate ──▶ embed text ──▶ candidate chunks ──▶ rank ──▶ assemble
//!                                       (entity / type /      (cosine,    (prompt,
//!                                        date filter)          top-k)      citations)
//! ```
//!
//! An empty result is not an error: it yields the no-context sentinel and
//! `sufficient: false`.

use std::sync::Arc;

use anyhow::{bail, Result as AnyResult};

use crate::batch::BatchEmbedder;
use crate::config::Config;
use crate::context::{is_sufficient, render_citations, render_prompt};
use crate::db;
use crate::embedding::create_embedder;
use crate::error::{Error, Result};
use crate::models::{Query, QueryOutcome};
use crate::similarity::rank_chunks;
use crate::store::sqlite::SqliteStore;
use crate::store::{ChunkFilter, ChunkStore};

pub struct Retriever {
    embedder: BatchEmbedder,
    store: Arc<dyn ChunkStore>,
    min_chunks: usize,
}

impl Retriever {
    pub fn new(embedder: BatchEmbedder, store: Arc<dyn ChunkStore>) -> Self {
        Self {
            embedder,
            store,
            min_chunks: 1,
        }
    }

    /// Minimum number of contexts for an outcome to count as sufficient.
    pub fn with_min_chunks(mut self, min_chunks: usize) -> Self {
        self.min_chunks = min_chunks;
        self
    }

    pub async fn retrieve(&self, query: &Query) -> Result<QueryOutcome> {
        validate_query(query)?;

        let query_vec = self.embedder.embed_one(&query.text).await?;
        let candidates = self
            .store
            .find_chunks(&ChunkFilter::from_query(query))
            .await?;
        let candidate_count = candidates.len();

        let ranked = rank_chunks(
            &query_vec,
            candidates,
            query.similarity_threshold,
            query.top_k,
        )?;

        let prompt_text = render_prompt(&ranked.contexts);
        let citations = render_citations(&ranked.contexts);
        let sufficient = is_sufficient(&ranked.contexts, self.min_chunks);

        tracing::info!(
            entities = query.entity_ids.len(),
            candidates = candidate_count,
            skipped = ranked.skipped,
            returned = ranked.contexts.len(),
            sufficient,
            "retrieved context"
        );

        Ok(QueryOutcome {
            contexts: ranked.contexts,
            prompt_text,
            citations,
            sufficient,
        })
    }
}

fn validate_query(query: &Query) -> Result<()> {
    if query.text.trim().is_empty() {
        return Err(Error::invalid_query("query text is empty"));
    }
    if query.entity_ids.is_empty() || query.entity_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(Error::invalid_query("at least one non-empty entity id is required"));
    }
    if query.top_k == 0 {
        return Err(Error::invalid_query("top_k must be at least 1"));
    }
    if !(-1.0..=1.0).contains(&query.similarity_threshold) {
        return Err(Error::invalid_query(format!(
            "similarity threshold {} is outside [-1, 1]",
            query.similarity_threshold
        )));
    }
    Ok(())
}

/// `civic query`: run a retrieval against the configured database and print
/// the prompt context and citations (or the full outcome as JSON).
pub async fn run_query(config: &Config, query: &Query, json: bool) -> AnyResult<()> {
    if !config.embedding.is_enabled() {
        bail!("Querying requires embeddings. Set [embedding] provider in config.");
    }

    let embedder =
        BatchEmbedder::from_config(create_embedder(&config.embedding)?, &config.embedding);
    let pool = db::connect(config).await?;
    let retriever = Retriever::new(embedder, Arc::new(SqliteStore::new(pool.clone())))
        .with_min_chunks(config.retrieval.min_chunks);

    let result = retriever.retrieve(query).await;
    pool.close().await;
    let outcome = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.prompt_text);
        if !outcome.citations.is_empty() {
            println!();
            println!("Citations:");
            for citation in &outcome.citations {
                println!("  {}", citation);
            }
        }
        println!();
        println!(
            "sufficient: {} ({} chunks)",
            outcome.sufficient,
            outcome.contexts.len()
        );
    }

    Ok(())
}
