//! Core type definitions for the summarization pipeline.
//!
//! Work items flow in from the pending-work source, synthesis results and
//! processing outcomes flow out to the persistence sink.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Minimum trimmed length for any extracted summary field.
pub const MIN_FIELD_CHARS: usize = 10;

/// One pending paper awaiting summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Internal store id.
    pub id: i64,
    /// External identifier (arXiv id).
    pub external_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Location of the full document, if known.
    #[serde(default)]
    pub document_url: Option<String>,
}

/// The six structured fields produced for every paper, in extraction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryField {
    BeginnerTitle,
    IntermediateTitle,
    BeginnerOverview,
    IntermediateOverview,
    BeginnerSummary,
    IntermediateSummary,
}

impl SummaryField {
    /// All fields in declared order: titles, overviews, summaries.
    pub const ALL: [SummaryField; 6] = [
        SummaryField::BeginnerTitle,
        SummaryField::IntermediateTitle,
        SummaryField::BeginnerOverview,
        SummaryField::IntermediateOverview,
        SummaryField::BeginnerSummary,
        SummaryField::IntermediateSummary,
    ];

    /// Column / JSON key for the field.
    pub fn key(&self) -> &'static str {
        match self {
            SummaryField::BeginnerTitle => "beginner_title",
            SummaryField::IntermediateTitle => "intermediate_title",
            SummaryField::BeginnerOverview => "beginner_overview",
            SummaryField::IntermediateOverview => "intermediate_overview",
            SummaryField::BeginnerSummary => "beginner_summary",
            SummaryField::IntermediateSummary => "intermediate_summary",
        }
    }

    /// Header token the prompt asks the model to emit.
    pub fn header(&self) -> &'static str {
        match self {
            SummaryField::BeginnerTitle => "BEGINNER_TITLE",
            SummaryField::IntermediateTitle => "INTERMEDIATE_TITLE",
            SummaryField::BeginnerOverview => "BEGINNER_OVERVIEW",
            SummaryField::IntermediateOverview => "INTERMEDIATE_OVERVIEW",
            SummaryField::BeginnerSummary => "BEGINNER_SUMMARY",
            SummaryField::IntermediateSummary => "INTERMEDIATE_SUMMARY",
        }
    }

    /// Position in [`SummaryField::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for SummaryField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Six validated summary fields for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub beginner_title: String,
    pub intermediate_title: String,
    pub beginner_overview: String,
    pub intermediate_overview: String,
    pub beginner_summary: String,
    pub intermediate_summary: String,
}

impl SynthesisResult {
    /// Build a result from extracted fields.
    ///
    /// Returns `None` unless all six fields are present and each holds at
    /// least [`MIN_FIELD_CHARS`] characters after trimming.
    pub fn from_fields(fields: &HashMap<SummaryField, String>) -> Option<Self> {
        let get = |field: SummaryField| -> Option<String> {
            let value = fields.get(&field)?.trim();
            (value.chars().count() >= MIN_FIELD_CHARS).then(|| value.to_string())
        };
        Some(Self {
            beginner_title: get(SummaryField::BeginnerTitle)?,
            intermediate_title: get(SummaryField::IntermediateTitle)?,
            beginner_overview: get(SummaryField::BeginnerOverview)?,
            intermediate_overview: get(SummaryField::IntermediateOverview)?,
            beginner_summary: get(SummaryField::BeginnerSummary)?,
            intermediate_summary: get(SummaryField::IntermediateSummary)?,
        })
    }

    pub fn get(&self, field: SummaryField) -> &str {
        match field {
            SummaryField::BeginnerTitle => &self.beginner_title,
            SummaryField::IntermediateTitle => &self.intermediate_title,
            SummaryField::BeginnerOverview => &self.beginner_overview,
            SummaryField::IntermediateOverview => &self.intermediate_overview,
            SummaryField::BeginnerSummary => &self.beginner_summary,
            SummaryField::IntermediateSummary => &self.intermediate_summary,
        }
    }
}

/// Why a synthesis attempt did not yield a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or service failure during the call.
    Transport,
    /// The call succeeded but returned no text.
    EmptyResponse,
    /// Text was returned but the six fields could not be recovered.
    Parse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport failure"),
            FailureKind::EmptyResponse => write!(f, "empty response"),
            FailureKind::Parse => write!(f, "parse failure"),
        }
    }
}

/// Result of processing one work item.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Success(SynthesisResult),
    ParseFailure,
    TransportFailure,
    /// Item was already attempted in this run and was not processed again.
    Skipped,
}

impl ProcessingOutcome {
    /// Map a terminal synthesis failure onto an outcome. Empty responses are
    /// retried like transport failures and are reported the same way.
    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Parse => ProcessingOutcome::ParseFailure,
            FailureKind::Transport | FailureKind::EmptyResponse => {
                ProcessingOutcome::TransportFailure
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success(_))
    }
}

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    /// Per-request model override.
    #[serde(default)]
    pub model: Option<String>,
}

/// Token usage for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Response from a completion call. `text` may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}
