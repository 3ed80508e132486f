//! Provider-shaped prompts built from a question and its grounding context.

use crate::types::{ChatMessage, PromptPayload};
use serde::{Deserialize, Serialize};

/// Which request shape a provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    /// A system message followed by one user message.
    Messages,
    /// One instruction string ending in an answer cue.
    SinglePrompt,
}

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant specialized in answering questions about documents.
You must ONLY use the information provided in the sources to answer questions.
If the information is not in the sources, clearly state that you cannot answer based on the provided documents.
Be accurate, concise, and always cite your sources when possible.";

const SINGLE_PROMPT_PREAMBLE: &str = "You are a helpful AI assistant that answers questions based on the provided document context.

IMPORTANT INSTRUCTIONS:
1. Answer the question using ONLY the information from the provided sources below
2. If the answer cannot be found in the sources, say \"I cannot find this information in the provided document\"
3. Be specific and cite which source number you're using when possible
4. If sources contradict each other, mention both perspectives
5. Keep your answer concise but complete";

/// Build the request payload for `style`.
///
/// The instruction text is fixed; only `query` and `context` are interpolated.
pub fn build_prompt(query: &str, context: &str, style: PromptStyle) -> PromptPayload {
    match style {
        PromptStyle::Messages => PromptPayload::Messages(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Based on the following sources from the document, please answer the question.\n\n\
                 SOURCES:\n{context}\n\nQUESTION: {query}"
            )),
        ]),
        PromptStyle::SinglePrompt => PromptPayload::Prompt(format!(
            "{SINGLE_PROMPT_PREAMBLE}\n\nSOURCES:\n{context}\n\nQUESTION:\n{query}\n\nANSWER:"
        )),
    }
}
