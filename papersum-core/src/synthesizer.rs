//! Response synthesizer: prompt construction and the retry loop around the
//! generative-text call.
//!
//! Every attempt first passes rate-limiter admission. Empty and unparseable
//! responses are retried immediately with the identical prompt; transport
//! failures back off exponentially before the next admission.

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, SynthesisConfig};
use crate::extract;
use crate::providers::{RateLimiter, compute_backoff};
use crate::types::{CompletionRequest, FailureKind, SummaryField, SynthesisResult, TokenUsage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A successful synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub result: SynthesisResult,
    /// Model that produced the result.
    pub model: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Usage summed over every attempt.
    pub usage: TokenUsage,
}

/// Every attempt failed. Carries the class of the last failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} after {attempts} attempt(s): {message}")]
pub struct SynthesisFailure {
    pub kind: FailureKind,
    pub attempts: u32,
    pub message: String,
}

const PROMPT_TEMPLATE: &str = "\
You are summarizing a research paper for two audiences: curious beginners with no \
background in the field, and intermediate readers comfortable with technical terms.

Paper title: {title}

Abstract:
{abstract}

Excerpt from the full text:
{excerpt}

Write exactly six sections, in this order, each starting on its own line with the \
header shown followed by a colon. Do not add any other sections or commentary.

BEGINNER_TITLE: a short, jargon-free title
INTERMEDIATE_TITLE: a precise technical title
BEGINNER_OVERVIEW: two or three plain-language sentences on what the paper is about
INTERMEDIATE_OVERVIEW: two or three sentences on the problem, method and setting
BEGINNER_SUMMARY: one paragraph on what was found and why it matters
INTERMEDIATE_SUMMARY: one paragraph on the approach, key results and limitations
";

const MISSING_EXCERPT: &str = "(full text unavailable; rely on the title and abstract)";

/// Drives one paper through prompt, admission, completion and extraction.
pub struct ResponseSynthesizer {
    provider: Arc<dyn LlmProvider>,
    limiter: Arc<RateLimiter>,
    config: SynthesisConfig,
    temperature: f32,
    max_tokens: usize,
}

impl ResponseSynthesizer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        limiter: Arc<RateLimiter>,
        config: SynthesisConfig,
        llm: &LlmConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            config,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Build the prompt for one paper. The excerpt is cut to
    /// `excerpt_max_chars` characters first.
    pub fn build_prompt(&self, title: &str, abstract_text: &str, excerpt: &str) -> String {
        let excerpt = truncate_chars(excerpt.trim(), self.config.excerpt_max_chars);
        let excerpt = if excerpt.is_empty() {
            MISSING_EXCERPT
        } else {
            excerpt
        };
        PROMPT_TEMPLATE
            .replace("{title}", title.trim())
            .replace("{abstract}", abstract_text.trim())
            .replace("{excerpt}", excerpt)
    }

    /// Produce the six fields for one paper, making at most
    /// `max_retries + 1` attempts with the same prompt.
    pub async fn synthesize(
        &self,
        title: &str,
        abstract_text: &str,
        excerpt: &str,
    ) -> Result<Synthesis, SynthesisFailure> {
        let prompt = self.build_prompt(title, abstract_text, excerpt);
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut usage = TokenUsage::default();
        let mut last = (FailureKind::Transport, String::from("no attempt made"));

        for attempt in 0..max_attempts {
            self.limiter.admit().await;
            let request = CompletionRequest {
                prompt: prompt.clone(),
                temperature: self.temperature,
                max_tokens: Some(self.max_tokens),
                model: None,
            };

            match self.provider.complete(request).await {
                Ok(response) => {
                    usage.accumulate(&response.usage);
                    if response.text.trim().is_empty() {
                        warn!(
                            attempt = attempt + 1,
                            max_attempts,
                            finish_reason = response.finish_reason.as_deref().unwrap_or("none"),
                            "Empty response from model"
                        );
                        last = (FailureKind::EmptyResponse, "model returned no text".into());
                        continue;
                    }
                    match extract::extract(&response.text) {
                        Some(result) => {
                            info!(
                                attempt = attempt + 1,
                                model = self.provider.model_name(),
                                tokens = usage.total(),
                                "Synthesis succeeded"
                            );
                            return Ok(Synthesis {
                                result,
                                model: self.provider.model_name().to_string(),
                                attempts: attempt + 1,
                                usage,
                            });
                        }
                        None => {
                            warn!(
                                attempt = attempt + 1,
                                max_attempts,
                                response_chars = response.text.chars().count(),
                                "Could not extract all summary fields"
                            );
                            debug!(response = response.text.as_str(), "Unparseable response");
                            last = (
                                FailureKind::Parse,
                                format!(
                                    "could not extract {} fields from response",
                                    SummaryField::ALL.len()
                                ),
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "Generative-text call failed"
                    );
                    if attempt + 1 < max_attempts {
                        let backoff = compute_backoff(self.config.transport_backoff_ms, attempt, &e);
                        debug!(backoff_ms = backoff.as_millis() as u64, "Backing off before retry");
                        tokio::time::sleep(backoff).await;
                    }
                    last = (FailureKind::Transport, e.to_string());
                }
            }
        }

        let (kind, message) = last;
        Err(SynthesisFailure {
            kind,
            attempts: max_attempts,
            message,
        })
    }
}

/// Longest prefix of `s` with at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::LlmError;
    use crate::extract::render_sections;
    use std::time::Duration;
    use tokio::time::Instant;

    fn sample() -> SynthesisResult {
        SynthesisResult {
            beginner_title: "Teaching Computers to Read Charts".into(),
            intermediate_title: "Chart Question Answering with Vision-Language Models".into(),
            beginner_overview: "The paper builds a program that answers questions about graphs."
                .into(),
            intermediate_overview: "A ViT encoder is paired with a decoder trained on synthetic plots."
                .into(),
            beginner_summary: "The program answers most chart questions correctly.".into(),
            intermediate_summary: "The model reaches 81% accuracy on ChartQA, beating OCR pipelines."
                .into(),
        }
    }

    fn synthesizer(mock: Arc<MockLlmProvider>, max_retries: u32) -> ResponseSynthesizer {
        ResponseSynthesizer::new(
            mock,
            Arc::new(RateLimiter::new(0)),
            SynthesisConfig {
                max_retries,
                excerpt_max_chars: 50,
                transport_backoff_ms: 1000,
            },
            &LlmConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let mock = Arc::new(MockLlmProvider::new().with_model("gemini-test"));
        mock.queue_text(&render_sections(&sample()));
        let synth = synthesizer(mock.clone(), 2);

        let out = synth.synthesize("Title", "Abstract", "Excerpt").await.unwrap();
        assert_eq!(out.result, sample());
        assert_eq!(out.attempts, 1);
        assert_eq!(out.model, "gemini-test");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_then_success_uses_identical_prompt() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_text("");
        mock.queue_text("   ");
        mock.queue_text(&render_sections(&sample()));
        let synth = synthesizer(mock.clone(), 2);

        let out = synth.synthesize("Title", "Abstract", "Excerpt").await.unwrap();
        assert_eq!(out.attempts, 3);
        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts.iter().all(|p| p == &prompts[0]));
        assert_eq!(out.usage.total(), 3 * 150);
    }

    #[tokio::test]
    async fn test_always_unparseable_fails_after_bound() {
        let mock = Arc::new(MockLlmProvider::with_response("I cannot help with that."));
        let synth = synthesizer(mock.clone(), 2);

        let err = synth.synthesize("Title", "Abstract", "").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Parse);
        assert_eq!(err.attempts, 3);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_single_attempt() {
        let mock = Arc::new(MockLlmProvider::new());
        let synth = synthesizer(mock.clone(), 0);

        let err = synth.synthesize("Title", "Abstract", "").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::EmptyResponse);
        assert_eq!(err.attempts, 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_back_off_exponentially() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::Connection {
            message: "reset".into(),
        });
        mock.queue_error(LlmError::Timeout { timeout_secs: 120 });
        mock.queue_text(&render_sections(&sample()));
        let synth = synthesizer(mock.clone(), 2);

        let start = Instant::now();
        let out = synth.synthesize("Title", "Abstract", "").await.unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_transport_failure_reported_without_trailing_sleep() {
        let mock = Arc::new(MockLlmProvider::new());
        for _ in 0..2 {
            mock.queue_error(LlmError::RateLimited {
                retry_after_secs: 5,
            });
        }
        let synth = synthesizer(mock.clone(), 1);

        let start = Instant::now();
        let err = synth.synthesize("Title", "Abstract", "").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transport);
        assert!(err.message.contains("Rate limited"));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_passes_admission() {
        let mock = Arc::new(MockLlmProvider::new());
        let limiter = Arc::new(RateLimiter::new(2));
        let synth = ResponseSynthesizer::new(
            mock.clone(),
            limiter.clone(),
            SynthesisConfig {
                max_retries: 2,
                ..SynthesisConfig::default()
            },
            &LlmConfig::default(),
        );

        let start = Instant::now();
        let err = synth.synthesize("Title", "Abstract", "").await.unwrap_err();
        assert_eq!(err.attempts, 3);
        // Third admission waits for the window to slide.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[test]
    fn test_prompt_truncates_excerpt() {
        let mock = Arc::new(MockLlmProvider::new());
        let synth = synthesizer(mock, 2);
        let excerpt = "é".repeat(80);
        let prompt = synth.build_prompt("A Title", "An abstract.", &excerpt);
        assert!(prompt.contains(&"é".repeat(50)));
        assert!(!prompt.contains(&"é".repeat(51)));
        assert!(prompt.contains("Paper title: A Title"));
        for field in SummaryField::ALL {
            assert!(prompt.contains(&format!("{}:", field.header())));
        }
    }

    #[test]
    fn test_prompt_marks_missing_excerpt() {
        let synth = synthesizer(Arc::new(MockLlmProvider::new()), 2);
        let prompt = synth.build_prompt("A Title", "An abstract.", "   ");
        assert!(prompt.contains(MISSING_EXCERPT));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_failure_display() {
        let failure = SynthesisFailure {
            kind: FailureKind::Parse,
            attempts: 3,
            message: "could not extract 6 fields from response".into(),
        };
        assert_eq!(
            failure.to_string(),
            "parse failure after 3 attempt(s): could not extract 6 fields from response"
        );
    }
}
