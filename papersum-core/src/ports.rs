//! Collaborator traits consumed by the batch runner.
//!
//! The runner only sees these narrow interfaces; the SQLite store and the PDF
//! excerpt source in `papersum-tools` implement them, and tests substitute
//! in-memory fakes.

use crate::error::{DocumentError, StoreError};
use crate::synthesizer::Synthesis;
use crate::types::WorkItem;
use async_trait::async_trait;

/// Source of pending work items.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Up to `limit` items that have no summary record yet, in stable order.
    async fn pending(&self, limit: usize) -> Result<Vec<WorkItem>, StoreError>;

    /// Number of items still awaiting a summary record.
    async fn remaining(&self) -> Result<usize, StoreError>;
}

/// Source of plain-text document excerpts.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Bounded plain-text excerpt of the document at `url`.
    async fn excerpt(&self, url: &str) -> Result<String, DocumentError>;
}

/// Destination for summary and error records.
#[async_trait]
pub trait SummarySink: Send + Sync {
    /// Persist a completed summary for `item`.
    async fn save_summary(&self, item: &WorkItem, synthesis: &Synthesis) -> Result<(), StoreError>;

    /// Persist an error record for `item`.
    async fn save_failure(&self, item: &WorkItem, description: &str) -> Result<(), StoreError>;
}
