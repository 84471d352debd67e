//! Generative-text provider abstraction.
//!
//! The pipeline talks to the model through the `LlmProvider` trait so that the
//! concrete service can be swapped out (Gemini in production, a scripted mock
//! in tests).

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for generative-text providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a single-turn completion. A response with empty text is a
    /// valid `Ok` value; callers decide what to do with it.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name recorded alongside each summary.
    fn model_name(&self) -> &str;
}

/// A scripted provider for testing.
///
/// Each call pops the next queued outcome. When the queue is exhausted the
/// fallback text is returned (or an empty response when no fallback is set).
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// Override the reported model name.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Queue a text response for the next `complete` call.
    pub fn queue_text(&self, text: &str) {
        self.queue(Ok(Self::text_response(text)));
    }

    /// Queue an error for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.queue(Err(error));
    }

    pub fn queue(&self, outcome: Result<CompletionResponse, LlmError>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(outcome);
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("STOP".to_string()),
        }
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.prompt);

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(outcome) => outcome,
            None => Ok(Self::text_response(
                self.fallback.as_deref().unwrap_or_default(),
            )),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
