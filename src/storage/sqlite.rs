//! SQLite implementations of the storage interfaces.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::{Row, SqlitePool};

use crate::error_handling::DatabaseError;
use crate::findings::{Finding, ReportSchema, Severity};
use crate::normalize::normalize;
use crate::page::ProjectId;
use crate::repository::{CrawledUrl, PageReport, ReportStore, UrlRepository};

/// `crawled_urls` table access.
#[derive(Debug, Clone)]
pub struct SqliteUrlRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteUrlRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Records (or updates) a crawled URL.
    pub async fn record_crawled(
        &self,
        project: ProjectId,
        address: &str,
        status: u16,
        depth: u32,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO crawled_urls (project_id, address, normalized_address, status_code, depth, crawled_at_ms)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(project_id, normalized_address) DO UPDATE SET
                 address=excluded.address,
                 status_code=excluded.status_code,
                 depth=excluded.depth,
                 crawled_at_ms=excluded.crawled_at_ms",
        )
        .bind(project.0)
        .bind(address)
        .bind(normalize(address).as_str())
        .bind(i64::from(status))
        .bind(i64::from(depth))
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(self.pool.as_ref())
        .await
        .map_err(DatabaseError::SqlError)?;
        Ok(())
    }
}

fn status_from_db(raw: i64) -> anyhow::Result<u16> {
    u16::try_from(raw).with_context(|| format!("Invalid stored status code {}", raw))
}

#[async_trait]
impl UrlRepository for SqliteUrlRepository {
    async fn status_of(&self, project: ProjectId, address: &str) -> anyhow::Result<Option<u16>> {
        let row = sqlx::query(
            "SELECT status_code FROM crawled_urls WHERE project_id = ? AND normalized_address = ?",
        )
        .bind(project.0)
        .bind(normalize(address).as_str())
        .fetch_optional(self.pool.as_ref())
        .await
        .context("Failed to look up crawled URL status")?;
        match row {
            Some(row) => Ok(Some(status_from_db(row.try_get("status_code")?)?)),
            None => Ok(None),
        }
    }

    fn crawled_urls<'a>(
        &'a self,
        project: ProjectId,
    ) -> BoxStream<'a, anyhow::Result<CrawledUrl>> {
        sqlx::query("SELECT address, status_code FROM crawled_urls WHERE project_id = ? ORDER BY id")
            .bind(project.0)
            .fetch(self.pool.as_ref())
            .map(|row| {
                let row = row.context("Failed to stream crawled URLs")?;
                Ok(CrawledUrl {
                    address: row.try_get("address")?,
                    status: status_from_db(row.try_get("status_code")?)?,
                })
            })
            .boxed()
    }
}

/// `findings`, `report_rows` and `report_schemas` table access.
#[derive(Debug, Clone)]
pub struct SqliteReportStore {
    pool: Arc<SqlitePool>,
}

impl SqliteReportStore {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Stored findings of a project in insertion order.
    pub async fn findings(&self, project: ProjectId) -> Result<Vec<(String, Finding)>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT page_url, task_key, finding_key, severity, code, message, payload_json, occurrence_count
             FROM findings WHERE project_id = ? ORDER BY id",
        )
        .bind(project.0)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut findings = Vec::with_capacity(rows.len());
        for row in rows {
            let severity: String = row.try_get("severity")?;
            let payload: String = row.try_get("payload_json")?;
            let occurrences: i64 = row.try_get("occurrence_count")?;
            findings.push((
                row.try_get("page_url")?,
                Finding {
                    task_key: row.try_get("task_key")?,
                    key: row.try_get("finding_key")?,
                    severity: match severity.as_str() {
                        "error" => Severity::Error,
                        "warning" => Severity::Warning,
                        _ => Severity::Info,
                    },
                    code: row.try_get("code")?,
                    message: row.try_get("message")?,
                    payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                    occurrence_count: u32::try_from(occurrences).unwrap_or(u32::MAX),
                },
            ));
        }
        Ok(findings)
    }

    /// Number of stored rows of one report.
    pub async fn row_count(&self, project: ProjectId, schema_key: &str) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM report_rows WHERE project_id = ? AND schema_key = ?",
        )
        .bind(project.0)
        .bind(schema_key)
        .fetch_one(self.pool.as_ref())
        .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn register_schema(&self, task_key: &str, schema: &ReportSchema) -> anyhow::Result<()> {
        let columns = serde_json::to_string(&schema.columns)?;
        sqlx::query(
            "INSERT INTO report_schemas (schema_key, task_key, title, columns_json, registered_at_ms)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(schema_key) DO UPDATE SET
                 task_key=excluded.task_key,
                 title=excluded.title,
                 columns_json=excluded.columns_json",
        )
        .bind(&schema.key)
        .bind(task_key)
        .bind(&schema.title)
        .bind(columns)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(self.pool.as_ref())
        .await
        .with_context(|| format!("Failed to register report schema '{}'", schema.key))?;
        Ok(())
    }

    async fn persist(&self, report: &PageReport) -> anyhow::Result<()> {
        if report.findings.is_empty() && report.rows.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start report transaction")?;

        for finding in &report.findings {
            sqlx::query(
                "INSERT INTO findings (project_id, page_url, url_id, task_key, finding_key, severity, code, message, payload_json, occurrence_count, created_at_ms)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(report.project.0)
            .bind(&report.page_url)
            .bind(report.url_id)
            .bind(&finding.task_key)
            .bind(&finding.key)
            .bind(finding.severity.as_str())
            .bind(&finding.code)
            .bind(&finding.message)
            .bind(serde_json::to_string(&finding.payload)?)
            .bind(i64::from(finding.occurrence_count))
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert finding '{}'", finding.key))?;
        }

        for (task_key, row) in &report.rows {
            sqlx::query(
                "INSERT INTO report_rows (project_id, page_url, url_id, task_key, schema_key, values_json, occurrence_count, created_at_ms)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(report.project.0)
            .bind(&report.page_url)
            .bind(report.url_id)
            .bind(task_key)
            .bind(&row.schema)
            .bind(serde_json::to_string(&row.values)?)
            .bind(i64::from(row.occurrence_count))
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert '{}' report row", row.schema))?;
        }

        tx.commit().await.context("Failed to commit page report")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::ColumnKind;
    use crate::storage::{init_memory_pool, run_migrations};
    use futures::TryStreamExt;
    use serde_json::json;

    async fn pool() -> Arc<SqlitePool> {
        let pool = init_memory_pool().await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn test_record_and_lookup_normalized() {
        let repo = SqliteUrlRepository::new(pool().await);
        repo.record_crawled(ProjectId(1), "https://Example.com/a/", 200, 0)
            .await
            .unwrap();
        repo.record_crawled(ProjectId(1), "https://example.com/a", 404, 1)
            .await
            .unwrap();
        repo.record_crawled(ProjectId(2), "https://example.com/a", 301, 0)
            .await
            .unwrap();

        assert_eq!(
            repo.status_of(ProjectId(1), "https://example.com/a").await.unwrap(),
            Some(404)
        );
        assert_eq!(
            repo.status_of(ProjectId(1), "https://example.com/missing").await.unwrap(),
            None
        );

        let urls: Vec<CrawledUrl> = repo.crawled_urls(ProjectId(1)).try_collect().await.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].status, 404);
    }

    #[tokio::test]
    async fn test_persist_and_read_back() {
        let pool = pool().await;
        let store = SqliteReportStore::new(Arc::clone(&pool));
        let schema = ReportSchema::new("redirect_chains", "Redirect chains")
            .column("start", ColumnKind::Url)
            .column("hops", ColumnKind::Integer);
        store.register_schema("redirects", &schema).await.unwrap();
        // registering twice keeps one schema
        store.register_schema("redirects", &schema).await.unwrap();

        let report = PageReport {
            project: ProjectId(1),
            page_url: "https://example.com/a".into(),
            url_id: Some(7),
            findings: vec![Finding {
                task_key: "redirects".into(),
                key: "loop|a".into(),
                severity: Severity::Error,
                code: "redirect_loop".into(),
                message: "Redirect loop".into(),
                payload: json!({"occurrenceCount": 2}),
                occurrence_count: 2,
            }],
            rows: vec![(
                "redirects".into(),
                schema.row(vec![json!("https://example.com/a"), json!(3)]).unwrap(),
            )],
        };
        store.persist(&report).await.unwrap();

        let stored = store.findings(ProjectId(1)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, "https://example.com/a");
        assert_eq!(stored[0].1, report.findings[0]);
        assert_eq!(store.row_count(ProjectId(1), "redirect_chains").await.unwrap(), 1);
        assert!(store.findings(ProjectId(2)).await.unwrap().is_empty());
    }
}
