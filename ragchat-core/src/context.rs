//! Grounding-context rendering and answer assembly.
//!
//! Both functions are pure: they never reorder, deduplicate or truncate the
//! chunks they are given, so citation `[Source i]` in the context and
//! `sources[i - 1]` in the answer always refer to the same chunk.

use crate::types::{AnswerResult, RetrievedChunk, SourceDocument};

/// Render retrieved chunks as numbered, score-annotated sources.
///
/// Each entry is `[Source i] (Relevance: s)\n{content}\n` with the score to
/// three decimals; entries are joined by a newline, leaving one blank line
/// between them.
pub fn format_sources(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(idx, chunk)| {
            format!(
                "[Source {}] (Relevance: {:.3})\n{}\n",
                idx + 1,
                chunk.relevance_score,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pair the generated answer with the chunks that grounded it.
pub fn assemble_answer(
    answer: impl Into<String>,
    chunks: &[RetrievedChunk],
    model_used: impl Into<String>,
) -> AnswerResult {
    let sources: Vec<SourceDocument> = chunks
        .iter()
        .map(|chunk| SourceDocument {
            content: chunk.content.clone(),
            score: chunk.relevance_score,
            metadata: chunk.metadata.clone(),
        })
        .collect();
    debug_assert_eq!(sources.len(), chunks.len());

    AnswerResult {
        answer: answer.into(),
        sources,
        model_used: model_used.into(),
    }
}
