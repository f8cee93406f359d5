//! Sentence-boundary text chunker.
//!
//! Splits document body text into [`Chunk`]s of at most `max_chars`
//! characters. Sentences end at a run of `.`, `!` or `?` followed by
//! whitespace (or end of input) and are accumulated greedily; a sentence
//! that alone exceeds the limit is hard-split at whitespace.
//!
//! Chunks shorter than `min_chars` are dropped so that near-empty
//! fragments never reach the embedder. Every chunk is the exact slice of
//! the body at its [`Span`], and each receives a stable UUID derived from
//! its document ID and index so that re-ingesting a document overwrites the
//! same keys.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document, Span};

/// Chunk size bounds, in characters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingParams {
    pub max_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            max_chars: 500,
            min_chars: 50,
        }
    }
}

/// Split a document into provenance-carrying chunks with contiguous
/// indices starting at 0.
pub fn chunk_document(doc: &Document, params: &ChunkingParams) -> Vec<Chunk> {
    let provenance = doc.provenance();
    chunk_spans(&doc.body, params)
        .into_iter()
        .enumerate()
        .map(|(i, span)| {
            let text = &doc.body[span.start..span.end];
            Chunk {
                id: chunk_id(&doc.id, i as i64),
                document_id: doc.id.clone(),
                chunk_index: i as i64,
                text: text.to_string(),
                span,
                hash: text_hash(text),
                provenance: provenance.clone(),
            }
        })
        .collect()
}

/// Compute chunk spans over `text`.
///
/// Returns no spans for empty or whitespace-only input. When every chunk
/// falls below `min_chars`, the longest one is kept so that non-empty input
/// always yields at least one chunk.
pub fn chunk_spans(text: &str, params: &ChunkingParams) -> Vec<Span> {
    let max_chars = params.max_chars.max(1);

    let mut candidates: Vec<Span> = Vec::new();
    let mut current: Option<Span> = None;

    for sentence in sentence_spans(text) {
        for piece in split_oversized(text, sentence, max_chars) {
            current = match current {
                None => Some(piece),
                Some(cur) => {
                    let merged = Span::new(cur.start, piece.end);
                    if char_len(text, merged) > max_chars {
                        candidates.push(cur);
                        Some(piece)
                    } else {
                        Some(merged)
                    }
                }
            };
        }
    }

    if let Some(cur) = current {
        candidates.push(cur);
    }

    let kept: Vec<Span> = candidates
        .iter()
        .copied()
        .filter(|s| char_len(text, *s) >= params.min_chars)
        .collect();

    if kept.is_empty() {
        return candidates
            .into_iter()
            .max_by_key(|s| char_len(text, *s))
            .into_iter()
            .collect();
    }

    kept
}

/// Split text into sentence spans, trimmed of surrounding whitespace.
///
/// Text with no terminal punctuation comes back as a single sentence.
pub fn sentence_spans(text: &str) -> Vec<Span> {
    let mut sentences = Vec::new();
    let mut start: Option<usize> = None;
    let mut after_terminator = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if after_terminator {
                if let Some(s) = start.take() {
                    sentences.push(Span::new(s, i));
                }
            }
            after_terminator = false;
            continue;
        }

        if start.is_none() {
            start = Some(i);
        }
        after_terminator = is_terminal(c);
    }

    if let Some(s) = start {
        let end = s + text[s..].trim_end().len();
        sentences.push(Span::new(s, end));
    }

    sentences
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Break a span longer than `max_chars` at the last whitespace before the
/// limit, or exactly at the limit when the window has no whitespace.
fn split_oversized(text: &str, span: Span, max_chars: usize) -> Vec<Span> {
    if char_len(text, span) <= max_chars {
        return vec![span];
    }

    let mut pieces = Vec::new();
    let mut start = span.start;

    while start < span.end {
        let rest = &text[start..span.end];
        let limit = match rest.char_indices().nth(max_chars) {
            Some((offset, _)) => start + offset,
            None => {
                pieces.push(Span::new(start, span.end));
                break;
            }
        };

        let window = &text[start..limit];
        let (piece_end, next_start) = match window.rfind(char::is_whitespace) {
            Some(pos) if pos > 0 => {
                let ws_len = window[pos..].chars().next().map_or(1, char::len_utf8);
                (start + pos, start + pos + ws_len)
            }
            _ => (limit, limit),
        };

        let piece_end = start + text[start..piece_end].trim_end().len();
        if piece_end > start {
            pieces.push(Span::new(start, piece_end));
        }

        start = match text[next_start..span.end].find(|c: char| !c.is_whitespace()) {
            Some(offset) => next_start + offset,
            None => span.end,
        };
    }

    pieces
}

fn char_len(text: &str, span: Span) -> usize {
    text[span.start..span.end].chars().count()
}

fn chunk_id(document_id: &str, index: i64) -> String {
    let name = format!("{}:{}", document_id, index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
