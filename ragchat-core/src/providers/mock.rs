//! Scripted provider for tests and offline runs.

use super::LlmProvider;
use crate::error::LlmError;
use crate::prompt::PromptStyle;
use crate::types::PromptPayload;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A provider that answers with a fixed reply (or a fixed error) and records
/// what it was asked.
pub struct MockProvider {
    label: String,
    style: PromptStyle,
    reply: Result<String, String>,
    calls: AtomicUsize,
    last: Mutex<Option<(PromptPayload, f32)>>,
}

impl MockProvider {
    pub fn new(label: &str, style: PromptStyle) -> Self {
        Self {
            label: label.to_string(),
            style,
            reply: Ok("mock answer".to_string()),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    /// Always answer with `text`.
    pub fn with_reply(mut self, text: &str) -> Self {
        self.reply = Ok(text.to_string());
        self
    }

    /// Always fail with an `ApiRequest` error carrying `message`.
    pub fn failing(label: &str, message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::new(label, PromptStyle::Messages)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The payload and temperature of the most recent call.
    pub fn last_request(&self) -> Option<(PromptPayload, f32)> {
        self.last.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn prompt_style(&self) -> PromptStyle {
        self.style
    }

    async fn generate(
        &self,
        payload: &PromptPayload,
        temperature: f32,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last.lock() {
            *last = Some((payload.clone(), temperature));
        }
        self.reply.clone().map_err(|message| LlmError::ApiRequest { message })
    }
}
