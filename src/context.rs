//! Prompt context and citation rendering.
//!
//! Turns a ranked [`RetrievedContext`] list into a prompt-ready text block
//! and a parallel list of citations, both numbered from 1 in rank order.
//!
//! ```text
//! [1] The senator voted against the measure. (2024-03-12) [voting_record]
//! Source: Roll Call Vote 112
//!
//! [2] ...
//! ```

use crate::models::RetrievedContext;

/// Prompt text emitted when nothing passed the similarity threshold.
pub const NO_CONTEXT_SENTINEL: &str = "No relevant context found.";

/// A retrieval only counts as grounded if some chunk scores above this.
pub const CONFIDENCE_FLOOR: f64 = 0.3;

const DEFAULT_CITATION_TITLE: &str = "Official Document";

/// Render contexts into a single prompt block.
///
/// Returns [`NO_CONTEXT_SENTINEL`] for an empty list, never an empty string.
pub fn render_prompt(contexts: &[RetrievedContext]) -> String {
    if contexts.is_empty() {
        return NO_CONTEXT_SENTINEL.to_string();
    }

    contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| {
            let mut entry = format!("[{}] {}", i + 1, ctx.text.trim());
            if let Some(date) = ctx.provenance.date {
                entry.push_str(&format!(" ({})", date.format("%Y-%m-%d")));
            }
            entry.push_str(&format!(" [{}]", ctx.provenance.document_type));

            let source = ctx
                .provenance
                .source_title
                .as_deref()
                .unwrap_or(&ctx.provenance.source_url);
            entry.push_str(&format!("\nSource: {}", source));
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One citation per context, in the same order as [`render_prompt`].
pub fn render_citations(contexts: &[RetrievedContext]) -> Vec<String> {
    contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| {
            let title = ctx
                .provenance
                .source_title
                .as_deref()
                .unwrap_or(DEFAULT_CITATION_TITLE);
            match ctx.provenance.date {
                Some(date) => format!(
                    "[{}] {} ({}) - {}",
                    i + 1,
                    title,
                    date.format("%Y-%m-%d"),
                    ctx.provenance.source_url
                ),
                None => format!("[{}] {} - {}", i + 1, title, ctx.provenance.source_url),
            }
        })
        .collect()
}

/// True when at least `min_chunks` contexts were retrieved and at least
/// one scores strictly above [`CONFIDENCE_FLOOR`].
pub fn is_sufficient(contexts: &[RetrievedContext], min_chunks: usize) -> bool {
    contexts.len() >= min_chunks && contexts.iter().any(|c| c.similarity > CONFIDENCE_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, Provenance};
    use chrono::NaiveDate;

    fn ctx(text: &str, similarity: f64, title: Option<&str>, date: Option<&str>) -> RetrievedContext {
        RetrievedContext {
            chunk_id: "c".to_string(),
            text: text.to_string(),
            similarity,
            provenance: Provenance {
                entity_id: "E1".to_string(),
                document_type: DocumentType::PressRelease,
                source_url: "https://example.gov/doc".to_string(),
                source_title: title.map(str::to_string),
                date: date.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            },
        }
    }

    #[test]
    fn test_empty_renders_sentinel() {
        assert_eq!(render_prompt(&[]), NO_CONTEXT_SENTINEL);
        assert!(render_citations(&[]).is_empty());
    }

    #[test]
    fn test_prompt_format() {
        let contexts = vec![
            ctx("Voted yes on the bill.", 0.9, Some("Roll Call 12"), Some("2024-03-12")),
            ctx("Issued a statement.", 0.8, None, None),
        ];
        let prompt = render_prompt(&contexts);
        assert_eq!(
            prompt,
            "[1] Voted yes on the bill. (2024-03-12) [press_release]\nSource: Roll Call 12\n\n\
             [2] Issued a statement. [press_release]\nSource: https://example.gov/doc"
        );
    }

    #[test]
    fn test_citation_format() {
        let contexts = vec![
            ctx("a", 0.9, Some("Roll Call 12"), Some("2024-03-12")),
            ctx("b", 0.8, None, None),
        ];
        assert_eq!(
            render_citations(&contexts),
            vec![
                "[1] Roll Call 12 (2024-03-12) - https://example.gov/doc",
                "[2] Official Document - https://example.gov/doc",
            ]
        );
    }

    #[test]
    fn test_sufficiency() {
        assert!(!is_sufficient(&[], 1));
        assert!(is_sufficient(&[ctx("a", 0.31, None, None)], 1));
        assert!(!is_sufficient(&[ctx("a", 0.3, None, None)], 1));
        assert!(!is_sufficient(&[ctx("a", 0.9, None, None)], 2));
        assert!(is_sufficient(
            &[ctx("a", 0.2, None, None), ctx("b", 0.9, None, None)],
            2
        ));
    }
}
