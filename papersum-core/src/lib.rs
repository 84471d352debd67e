//! # papersum Core
//!
//! Core library for the papersum summarization pipeline. Provides the rate
//! limiter, the generative-text provider abstraction, the response
//! synthesizer and extractor, and the batch runner.

pub mod brain;
pub mod config;
pub mod error;
pub mod extract;
pub mod ports;
pub mod providers;
pub mod runner;
pub mod synthesizer;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{PipelineConfig, load_config};
pub use error::{DocumentError, LlmError, StoreError};
pub use ports::{DocumentSource, SummarySink, WorkSource};
pub use providers::{GeminiProvider, RateLimiter, create_provider};
pub use runner::{BatchRunner, BatchStats, RunReport, RunnerState, StopReason};
pub use synthesizer::{ResponseSynthesizer, Synthesis, SynthesisFailure};
pub use types::{
    CompletionRequest, CompletionResponse, FailureKind, ProcessingOutcome, SummaryField,
    SynthesisResult, TokenUsage, WorkItem,
};
