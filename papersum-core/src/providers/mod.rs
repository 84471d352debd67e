//! Generative-text provider implementations and call pacing.
//!
//! Use `create_provider()` to instantiate the configured provider, and share a
//! single [`RateLimiter`] across every caller of that provider.

pub mod gemini;
pub mod rate_limiter;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiProvider;
pub use rate_limiter::RateLimiter;

/// Upper bound on any single transport backoff.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Create the provider named in `config.provider`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Ok(Arc::new(GeminiProvider::new(config)?)),
        other => Err(LlmError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

/// Compute the delay before retrying after a transport failure.
///
/// Exponential in `attempt` (0-based) from `base_ms`, capped at
/// [`MAX_BACKOFF`]. A server-provided retry-after wins when it is longer.
pub fn compute_backoff(base_ms: u64, attempt: u32, err: &LlmError) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let computed = Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF);
    if let LlmError::RateLimited { retry_after_secs } = err {
        return Duration::from_secs(*retry_after_secs).max(computed);
    }
    computed
}
