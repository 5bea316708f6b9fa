//! `SQLite` implementation of [`HistoryRepository`].

use std::future::Future;

use sqlx::SqlitePool;

use wbhub_app::ports::HistoryRepository;
use wbhub_domain::error::HubError;
use wbhub_domain::history::HistoryEntry;

use crate::error::StorageError;

const INSERT: &str = r"
    INSERT INTO history (device_id, control_id, value, error, created_at)
    VALUES (?, ?, ?, ?, ?)
";

/// `SQLite`-backed append-only history log.
pub struct SqliteHistoryRepository {
    pool: SqlitePool,
}

impl SqliteHistoryRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl HistoryRepository for SqliteHistoryRepository {
    fn append_many(
        &self,
        entries: Vec<HistoryEntry>,
    ) -> impl Future<Output = Result<usize, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            if entries.is_empty() {
                return Ok(0);
            }

            let mut tx = pool.begin().await.map_err(StorageError::from)?;
            for entry in &entries {
                sqlx::query(INSERT)
                    .bind(&entry.device_id)
                    .bind(&entry.control_id)
                    .bind(&entry.value)
                    .bind(&entry.error)
                    .bind(entry.created_at.to_rfc3339())
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
            }
            tx.commit().await.map_err(StorageError::from)?;

            tracing::debug!(count = entries.len(), "history appended");
            Ok(entries.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use sqlx::Row;
    use wbhub_domain::time::Timestamp;

    use super::*;
    use crate::pool::{Config, Database};

    async fn setup() -> (Database, SqliteHistoryRepository) {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        let repo = SqliteHistoryRepository::new(db.pool().clone());
        (db, repo)
    }

    fn at(second: u32) -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, second)
            .unwrap()
    }

    fn entry(control: &str, value: &str, second: u32) -> HistoryEntry {
        HistoryEntry {
            device_id: "wb-mr6cu_21".to_string(),
            control_id: control.to_string(),
            value: value.to_string(),
            error: String::new(),
            created_at: at(second),
        }
    }

    #[tokio::test]
    async fn should_append_batch_in_order() {
        let (db, repo) = setup().await;

        let written = repo
            .append_many(vec![entry("K1", "1", 0), entry("K1", "0", 5), entry("K2", "1", 7)])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let rows = sqlx::query("SELECT * FROM history ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap();
        let stored: Vec<(String, String, Timestamp)> = rows
            .iter()
            .map(|row| {
                (
                    row.get("control_id"),
                    row.get("value"),
                    chrono::DateTime::parse_from_rfc3339(row.get("created_at"))
                        .unwrap()
                        .to_utc(),
                )
            })
            .collect();
        assert_eq!(
            stored,
            vec![
                ("K1".to_string(), "1".to_string(), at(0)),
                ("K1".to_string(), "0".to_string(), at(5)),
                ("K2".to_string(), "1".to_string(), at(7)),
            ]
        );
    }

    #[tokio::test]
    async fn should_accept_empty_batch() {
        let (_db, repo) = setup().await;
        assert_eq!(repo.append_many(Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn should_keep_appending_duplicates() {
        let (db, repo) = setup().await;

        repo.append_many(vec![entry("K1", "1", 0)]).await.unwrap();
        repo.append_many(vec![entry("K1", "1", 0)]).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
