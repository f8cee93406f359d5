//! Cosine similarity ranking over candidate chunks.
//!
//! # Ranking Algorithm
//!
//! 1. Parse each candidate's stored vector.
//! 2. Score it against the query vector with [`cosine_similarity`].
//! 3. Drop candidates scoring below the similarity threshold.
//! 4. Stable sort by similarity (desc); ties keep their input order.
//! 5. Truncate to `top_k`.
//!
//! Candidates whose vector cannot be parsed, is the zero vector, or has the
//! wrong dimensionality are skipped with a warning; one bad row never
//! aborts the ranking.
//!
//! This is a brute-force O(n·d) scan with no index structure. It is sized
//! for tens of thousands of chunks per query; beyond that an ANN index
//! would be needed.

use std::cmp::Ordering;

use crate::embedding::parse_vector;
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, RetrievedContext};

/// Compute cosine similarity between two embedding vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
///
/// The result is clamped to `[-1.0, 1.0]`. Empty vectors, vectors of
/// different lengths, and zero vectors are errors rather than a silent 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.is_empty() || a.len() != b.len() {
        return Err(Error::embedding(format!(
            "cannot compare vectors of length {} and {}",
            a.len(),
            b.len()
        )));
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(Error::embedding("cosine similarity of a zero vector"));
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !sim.is_finite() {
        return Err(Error::embedding("cosine similarity is not finite"));
    }

    Ok(sim.clamp(-1.0, 1.0))
}

/// An item paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct Ranked<T> {
    pub item: T,
    pub similarity: f64,
}

/// Keep items with `similarity >= threshold`, sorted descending with ties
/// in input order, truncated to `top_k`.
pub fn select_top_k<T>(scored: Vec<Ranked<T>>, threshold: f64, top_k: usize) -> Vec<Ranked<T>> {
    let mut kept: Vec<Ranked<T>> = scored
        .into_iter()
        .filter(|r| r.similarity >= threshold)
        .collect();

    kept.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    kept.truncate(top_k);
    kept
}

/// Result of ranking a candidate set.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub contexts: Vec<RetrievedContext>,
    /// Candidates that were skipped as malformed.
    pub skipped: usize,
}

/// Rank stored chunks against a query vector.
///
/// # Errors
///
/// Fails only when the query vector itself is unusable (empty or zero).
pub fn rank_chunks(
    query_vec: &[f32],
    candidates: Vec<ChunkRecord>,
    threshold: f64,
    top_k: usize,
) -> Result<RankOutcome> {
    if query_vec.is_empty() || query_vec.iter().all(|v| *v == 0.0) {
        return Err(Error::embedding("query embedding is empty or the zero vector"));
    }

    let mut skipped = 0usize;
    let mut scored: Vec<Ranked<ChunkRecord>> = Vec::with_capacity(candidates.len());

    for record in candidates {
        match score_record(query_vec, &record) {
            Ok(similarity) => scored.push(Ranked {
                item: record,
                similarity,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed chunk");
                skipped += 1;
            }
        }
    }

    let contexts = select_top_k(scored, threshold, top_k)
        .into_iter()
        .map(|r| RetrievedContext {
            chunk_id: r.item.chunk.id,
            text: r.item.chunk.text,
            similarity: r.similarity,
            provenance: r.item.chunk.provenance,
        })
        .collect();

    Ok(RankOutcome { contexts, skipped })
}

fn score_record(query_vec: &[f32], record: &ChunkRecord) -> Result<f64> {
    let chunk_id = &record.chunk.id;
    let vector = parse_vector(&record.embedding)
        .map_err(|e| Error::malformed(chunk_id, format!("unparseable embedding: {}", e)))?;

    if vector.len() != query_vec.len() {
        return Err(Error::malformed(
            chunk_id,
            format!(
                "embedding has {} dimensions, query has {}",
                vector.len(),
                query_vec.len()
            ),
        ));
    }
    if record.chunk.text.trim().is_empty() {
        return Err(Error::malformed(chunk_id, "empty chunk text"));
    }

    cosine_similarity(query_vec, &vector).map_err(|e| Error::malformed(chunk_id, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vector_to_string;
    use crate::models::{Chunk, DocumentType, Provenance, Span};

    /// Deterministic pseudo-random vectors in [-1, 1).
    fn vectors(count: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                (0..dims)
                    .map(|_| {
                        state = state
                            .wrapping_mul(6364136223846793005)
                            .wrapping_add(1442695040888963407);
                        ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
                    })
                    .collect()
            })
            .collect()
    }

    /// A unit 2-d vector whose cosine with `[1, 0]` is `sim`.
    fn at_similarity(sim: f32) -> Vec<f32> {
        vec![sim, (1.0 - sim * sim).sqrt()]
    }

    fn record(id: &str, vector: &[f32]) -> ChunkRecord {
        record_raw(id, &vector_to_string(vector))
    }

    fn record_raw(id: &str, embedding: &str) -> ChunkRecord {
        ChunkRecord {
            chunk: Chunk {
                id: id.to_string(),
                document_id: "doc".to_string(),
                chunk_index: 0,
                text: format!("text of {}", id),
                span: Span::new(0, 10),
                hash: String::new(),
                provenance: Provenance {
                    entity_id: "E1".to_string(),
                    document_type: DocumentType::VotingRecord,
                    source_url: "https://example.gov".to_string(),
                    source_title: None,
                    date: None,
                },
            },
            embedding: embedding.to_string(),
        }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-9);
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_rejects_zero_and_mismatched() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_err());
        assert!(cosine_similarity(&[1.0, 2.0], &[1.0]).is_err());
        assert!(cosine_similarity(&[], &[]).is_err());
    }

    #[test]
    fn test_cosine_symmetric_bounded_and_self_one() {
        let vs = vectors(40, 16, 7);
        for a in &vs {
            let self_sim = cosine_similarity(a, a).unwrap();
            assert!((self_sim - 1.0).abs() < 1e-9);
            for b in &vs {
                let ab = cosine_similarity(a, b).unwrap();
                let ba = cosine_similarity(b, a).unwrap();
                assert_eq!(ab, ba);
                assert!((-1.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn test_threshold_then_top_k() {
        let sims = [0.9, 0.2, 0.6, 0.95, 0.4];
        let candidates: Vec<ChunkRecord> = sims
            .iter()
            .enumerate()
            .map(|(i, s)| record(&format!("c{}", i), &at_similarity(*s)))
            .collect();

        let outcome = rank_chunks(&[1.0, 0.0], candidates, 0.5, 2).unwrap();
        let ids: Vec<&str> = outcome.contexts.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c3", "c0"]);
        assert!((outcome.contexts[0].similarity - 0.95).abs() < 1e-6);
        assert!((outcome.contexts[1].similarity - 0.9).abs() < 1e-6);
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let scored = vec![
            Ranked { item: "a", similarity: 0.7 },
            Ranked { item: "b", similarity: 0.9 },
            Ranked { item: "c", similarity: 0.7 },
            Ranked { item: "d", similarity: 0.7 },
        ];
        let items: Vec<&str> = select_top_k(scored, 0.0, 10)
            .into_iter()
            .map(|r| r.item)
            .collect();
        assert_eq!(items, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_output_length_sorted_and_threshold_monotone() {
        let query = vectors(1, 8, 99).remove(0);
        let pool = vectors(60, 8, 3);
        let sims: Vec<f64> = pool
            .iter()
            .map(|v| cosine_similarity(&query, v).unwrap())
            .collect();

        let mut previous_len = usize::MAX;
        for threshold in [-1.0, -0.5, 0.0, 0.2, 0.4, 0.6, 0.9] {
            for top_k in [1, 5, 100] {
                let candidates: Vec<ChunkRecord> = pool
                    .iter()
                    .enumerate()
                    .map(|(i, v)| record(&format!("c{}", i), v))
                    .collect();
                let out = rank_chunks(&query, candidates, threshold, top_k).unwrap();

                let passing = sims.iter().filter(|s| **s >= threshold).count();
                assert_eq!(out.contexts.len(), top_k.min(passing));
                assert!(out
                    .contexts
                    .windows(2)
                    .all(|w| w[0].similarity >= w[1].similarity));
                assert!(out.contexts.iter().all(|c| c.similarity >= threshold));

                if top_k == 100 {
                    assert!(out.contexts.len() <= previous_len);
                    previous_len = out.contexts.len();
                }
            }
        }
    }

    #[test]
    fn test_malformed_candidates_skipped() {
        let candidates = vec![
            record("good", &[1.0, 0.0]),
            record_raw("garbage", "1.0,not-a-number"),
            record("short", &[1.0]),
            record("zero", &[0.0, 0.0]),
        ];
        let out = rank_chunks(&[1.0, 0.0], candidates, -1.0, 10).unwrap();
        assert_eq!(out.contexts.len(), 1);
        assert_eq!(out.contexts[0].chunk_id, "good");
        assert_eq!(out.skipped, 3);
    }

    #[test]
    fn test_zero_query_is_error() {
        let err = rank_chunks(&[0.0, 0.0], vec![record("a", &[1.0, 0.0])], 0.0, 5).unwrap_err();
        assert!(matches!(err, Error::Embedding { .. }));
    }
}
