//! SQLite upsert exporter.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::error::{ExportError, ExportResult};
use crate::traits::exporter::Exporter;
use crate::types::record::Record;

/// Upserts records into a `scraped_records` table keyed by `url`.
///
/// Re-exporting a record (job retry, replay) updates `data` and `updated_at`
/// in place; `first_seen_at` keeps the original insert time.
pub struct SqliteExporter {
    pool: SqlitePool,
}

impl SqliteExporter {
    pub async fn new(database_url: &str) -> ExportResult<Self> {
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await?;
        Self::from_pool(pool).await
    }

    /// Share a pool with another component (e.g. the job store).
    pub async fn from_pool(pool: SqlitePool) -> ExportResult<Self> {
        let exporter = Self { pool };
        exporter.run_migrations().await?;
        Ok(exporter)
    }

    pub async fn in_memory() -> ExportResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> ExportResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scraped_records (
                url TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                scraped_at TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scraped_records_source ON scraped_records(source);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of stored records.
    pub async fn count(&self) -> ExportResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scraped_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Stored payload for a natural key.
    pub async fn get_data(&self, url: &str) -> ExportResult<Option<serde_json::Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM scraped_records WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(data,)| serde_json::from_str(&data))
            .transpose()
            .map_err(ExportError::from)
    }
}

#[async_trait]
impl Exporter for SqliteExporter {
    fn exporter_type(&self) -> &str {
        "sqlite"
    }

    async fn export_records(&self, records: &[Record]) -> ExportResult<Vec<String>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let data = serde_json::to_string(&record.data)?;

            sqlx::query(
                r#"
                INSERT INTO scraped_records (url, source, data, scraped_at, first_seen_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    source = excluded.source,
                    data = excluded.data,
                    scraped_at = excluded.scraped_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(record.key())
            .bind(record.source.as_str())
            .bind(data)
            .bind(record.scraped_at.to_rfc3339())
            .bind(now.as_str())
            .bind(now.as_str())
            .execute(&mut *tx)
            .await?;

            ids.push(record.key().to_string());
        }

        tx.commit().await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_same_key_twice_is_one_row_with_latest_values() {
        let exporter = SqliteExporter::in_memory().await.unwrap();

        let first = Record::new("https://example.com/1", "test").with_field("price", 100);
        let second = Record::new("https://example.com/1", "test").with_field("price", 95);

        exporter.export_records(&[first]).await.unwrap();
        exporter.export_records(&[second]).await.unwrap();

        assert_eq!(exporter.count().await.unwrap(), 1);
        let data = exporter.get_data("https://example.com/1").await.unwrap().unwrap();
        assert_eq!(data["price"], json!(95));
    }

    #[tokio::test]
    async fn test_batch_insert() {
        let exporter = SqliteExporter::in_memory().await.unwrap();
        let records: Vec<_> = (1..=4)
            .map(|i| Record::new(format!("https://example.com/{}", i), "test"))
            .collect();

        let ids = exporter.export_records(&records).await.unwrap();

        assert_eq!(ids.len(), 4);
        assert_eq!(exporter.count().await.unwrap(), 4);
        assert_eq!(exporter.exporter_type(), "sqlite");
    }
}
