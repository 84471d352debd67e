//! SQLite work store.
//!
//! Papers are written to the `papers` table by the external feed ETL. This
//! store reads pending papers (those with no row in `paper_summaries`) and
//! writes exactly one summary row per paper, either `completed` or `error`.
//! Every operation opens its own connection on the blocking pool.

use async_trait::async_trait;
use papersum_core::error::StoreError;
use papersum_core::ports::{SummarySink, WorkSource};
use papersum_core::synthesizer::Synthesis;
use papersum_core::types::WorkItem;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS papers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    arxiv_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    abstract TEXT NOT NULL,
    pdf_url TEXT,
    published_date TEXT
);

CREATE TABLE IF NOT EXISTS paper_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paper_id INTEGER NOT NULL UNIQUE REFERENCES papers(id) ON DELETE CASCADE,
    beginner_title TEXT,
    intermediate_title TEXT,
    beginner_overview TEXT,
    intermediate_overview TEXT,
    beginner_summary TEXT,
    intermediate_summary TEXT,
    processing_status TEXT NOT NULL CHECK (processing_status IN ('completed', 'error')),
    error_message TEXT,
    model TEXT,
    created_at TEXT NOT NULL
);
";

/// Processing counts across the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

/// SQLite-backed work source and summary sink.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure both
    /// tables exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database {
                message: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }
        let store = Self { path };
        store
            .with_conn(|conn| conn.execute_batch(SCHEMA))
            .await?;
        debug!(path = %store.path.display(), "Store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counts of total, pending, completed and failed papers.
    pub async fn status(&self) -> Result<StoreStatus, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM papers),
                    (SELECT COUNT(*) FROM papers p
                        WHERE NOT EXISTS (SELECT 1 FROM paper_summaries s WHERE s.paper_id = p.id)),
                    (SELECT COUNT(*) FROM paper_summaries WHERE processing_status = 'completed'),
                    (SELECT COUNT(*) FROM paper_summaries WHERE processing_status = 'error')",
                [],
                |row| {
                    Ok(StoreStatus {
                        total: row.get::<_, i64>(0)? as usize,
                        pending: row.get::<_, i64>(1)? as usize,
                        completed: row.get::<_, i64>(2)? as usize,
                        failed: row.get::<_, i64>(3)? as usize,
                    })
                },
            )
        })
        .await
    }

    /// Delete error records so the affected papers become pending again.
    /// Returns the number of records removed.
    pub async fn reset_failed(&self) -> Result<usize, StoreError> {
        let removed = self
            .with_conn(|conn| {
                conn.execute(
                    "DELETE FROM paper_summaries WHERE processing_status = 'error'",
                    [],
                )
            })
            .await?;
        info!(removed, "Cleared failed summary records");
        Ok(removed)
    }

    /// Error message recorded for a paper, if its record is an error.
    pub async fn error_message(&self, paper_id: i64) -> Result<Option<String>, StoreError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT error_message FROM paper_summaries
                 WHERE paper_id = ?1 AND processing_status = 'error'",
                params![paper_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
        })
        .await
    }

    /// Run `op` against a fresh connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            op(&conn)
        })
        .await
        .map_err(|e| StoreError::Task {
            message: e.to_string(),
        })?
        .map_err(|e| StoreError::Database {
            message: e.to_string(),
        })
    }
}

fn write_failed(item_id: i64) -> impl FnOnce(StoreError) -> StoreError {
    move |e| match e {
        StoreError::Database { message } => StoreError::WriteFailed { item_id, message },
        other => other,
    }
}

#[async_trait]
impl WorkSource for SqliteStore {
    async fn pending(&self, limit: usize) -> Result<Vec<WorkItem>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.arxiv_id, p.title, p.abstract, p.pdf_url
                 FROM papers p
                 LEFT JOIN paper_summaries s ON s.paper_id = p.id
                 WHERE s.id IS NULL
                 ORDER BY p.id
                 LIMIT ?1",
            )?;
            let items = stmt
                .query_map(params![limit], |row| {
                    Ok(WorkItem {
                        id: row.get(0)?,
                        external_id: row.get(1)?,
                        title: row.get(2)?,
                        abstract_text: row.get(3)?,
                        document_url: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
    }

    async fn remaining(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM papers p
                 WHERE NOT EXISTS (SELECT 1 FROM paper_summaries s WHERE s.paper_id = p.id)",
                [],
                |row| row.get::<_, i64>(0),
            )
        })
        .await
        .map(|count| count as usize)
    }
}

#[async_trait]
impl SummarySink for SqliteStore {
    async fn save_summary(&self, item: &WorkItem, synthesis: &Synthesis) -> Result<(), StoreError> {
        let paper_id = item.id;
        let result = synthesis.result.clone();
        let model = synthesis.model.clone();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO paper_summaries (
                    paper_id, beginner_title, intermediate_title, beginner_overview,
                    intermediate_overview, beginner_summary, intermediate_summary,
                    processing_status, error_message, model, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'completed', NULL, ?8, ?9)
                 ON CONFLICT(paper_id) DO UPDATE SET
                    beginner_title = excluded.beginner_title,
                    intermediate_title = excluded.intermediate_title,
                    beginner_overview = excluded.beginner_overview,
                    intermediate_overview = excluded.intermediate_overview,
                    beginner_summary = excluded.beginner_summary,
                    intermediate_summary = excluded.intermediate_summary,
                    processing_status = 'completed',
                    error_message = NULL,
                    model = excluded.model,
                    created_at = excluded.created_at
                 WHERE paper_summaries.processing_status = 'error'",
                params![
                    paper_id,
                    result.beginner_title,
                    result.intermediate_title,
                    result.beginner_overview,
                    result.intermediate_overview,
                    result.beginner_summary,
                    result.intermediate_summary,
                    model,
                    created_at,
                ],
            )
        })
        .await
        .map_err(write_failed(paper_id))?;
        Ok(())
    }

    async fn save_failure(&self, item: &WorkItem, description: &str) -> Result<(), StoreError> {
        let paper_id = item.id;
        let description = description.to_string();
        let created_at = chrono::Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO paper_summaries (paper_id, processing_status, error_message, created_at)
                 VALUES (?1, 'error', ?2, ?3)
                 ON CONFLICT(paper_id) DO UPDATE SET
                    error_message = excluded.error_message,
                    created_at = excluded.created_at
                 WHERE paper_summaries.processing_status = 'error'",
                params![paper_id, description, created_at],
            )
        })
        .await
        .map_err(write_failed(paper_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papersum_core::types::{SynthesisResult, TokenUsage};
    use pretty_assertions::assert_eq;

    fn insert_papers(path: &Path, count: i64) {
        let conn = Connection::open(path).unwrap();
        for i in 1..=count {
            conn.execute(
                "INSERT INTO papers (arxiv_id, title, abstract, pdf_url) VALUES (?1, ?2, ?3, ?4)",
                params![
                    format!("2501.{:05}", i),
                    format!("Paper {}", i),
                    format!("Abstract {}", i),
                    if i % 2 == 0 {
                        None
                    } else {
                        Some(format!("https://arxiv.org/pdf/2501.{:05}", i))
                    },
                ],
            )
            .unwrap();
        }
    }

    fn synthesis() -> Synthesis {
        Synthesis {
            result: SynthesisResult {
                beginner_title: "beginner title text".into(),
                intermediate_title: "intermediate title text".into(),
                beginner_overview: "beginner overview text".into(),
                intermediate_overview: "intermediate overview text".into(),
                beginner_summary: "beginner summary text".into(),
                intermediate_summary: "intermediate summary text".into(),
            },
            model: "gemini-2.5-flash-lite".into(),
            attempts: 1,
            usage: TokenUsage::default(),
        }
    }

    async fn store_with(count: i64) -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("data").join("papers.sqlite"))
            .await
            .unwrap();
        insert_papers(store.path(), count);
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_creates_parent_and_schema() {
        let (_dir, store) = store_with(0).await;
        assert!(store.path().exists());
        assert_eq!(store.status().await.unwrap(), StoreStatus::default());
        // Re-opening is idempotent.
        SqliteStore::open(store.path().to_path_buf()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_is_ordered_and_limited() {
        let (_dir, store) = store_with(4).await;
        let items = store.pending(3).await.unwrap();
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(items[0].external_id, "2501.00001");
        assert_eq!(
            items[0].document_url.as_deref(),
            Some("https://arxiv.org/pdf/2501.00001")
        );
        assert_eq!(items[1].document_url, None);
        assert_eq!(store.remaining().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_recorded_items_leave_pending() {
        let (_dir, store) = store_with(3).await;
        let items = store.pending(10).await.unwrap();
        store.save_summary(&items[0], &synthesis()).await.unwrap();
        store.save_failure(&items[1], "parse failure").await.unwrap();

        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending.iter().map(|i| i.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(store.remaining().await.unwrap(), 1);
        assert_eq!(
            store.status().await.unwrap(),
            StoreStatus {
                total: 3,
                pending: 1,
                completed: 1,
                failed: 1,
            }
        );
        assert_eq!(
            store.error_message(items[1].id).await.unwrap().as_deref(),
            Some("parse failure")
        );
        assert_eq!(store.error_message(items[0].id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_record_never_replaces_completed() {
        let (_dir, store) = store_with(1).await;
        let items = store.pending(1).await.unwrap();
        store.save_summary(&items[0], &synthesis()).await.unwrap();
        store.save_failure(&items[0], "late failure").await.unwrap();

        let status = store.status().await.unwrap();
        assert_eq!(status.completed, 1);
        assert_eq!(status.failed, 0);
    }

    #[tokio::test]
    async fn test_reset_failed_makes_items_pending_again() {
        let (_dir, store) = store_with(2).await;
        let items = store.pending(2).await.unwrap();
        store.save_failure(&items[0], "transport failure").await.unwrap();
        store.save_summary(&items[1], &synthesis()).await.unwrap();
        assert_eq!(store.remaining().await.unwrap(), 0);

        assert_eq!(store.reset_failed().await.unwrap(), 1);
        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, items[0].id);
    }

    #[tokio::test]
    async fn test_write_for_unknown_paper_reports_item() {
        let (_dir, store) = store_with(0).await;
        let ghost = WorkItem {
            id: 99,
            external_id: "ghost".into(),
            title: "Ghost".into(),
            abstract_text: "Nothing".into(),
            document_url: None,
        };
        match store.save_summary(&ghost, &synthesis()).await {
            Err(StoreError::WriteFailed { item_id, .. }) => assert_eq!(item_id, 99),
            other => panic!("Expected WriteFailed, got {:?}", other),
        }
    }
}
