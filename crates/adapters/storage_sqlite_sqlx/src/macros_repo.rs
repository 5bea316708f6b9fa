//! `SQLite` implementation of [`MacrosRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use wbhub_app::ports::MacrosRepository;
use wbhub_domain::error::HubError;
use wbhub_domain::id::MacrosId;
use wbhub_domain::macros::MacrosConfig;
use wbhub_domain::time;

use crate::error::StorageError;
use crate::json;

/// Wrapper for converting database rows into domain [`MacrosConfig`].
struct Wrapper(MacrosConfig);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        Ok(Self(MacrosConfig {
            id: MacrosId::from_uuid(id),
            kind: row.try_get("type")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            labels: json::column(row, "labels")?,
            settings: json::column(row, "settings")?,
            state: json::column(row, "state")?,
        }))
    }
}

const SELECT_ALL: &str = "SELECT * FROM macros ORDER BY rowid";

const UPSERT: &str = r"
    INSERT INTO macros (id, type, name, description, labels, settings, state, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        type = excluded.type,
        name = excluded.name,
        description = excluded.description,
        labels = excluded.labels,
        settings = excluded.settings,
        state = excluded.state,
        updated_at = excluded.updated_at
";

const DELETE: &str = "DELETE FROM macros WHERE id = ?";

/// `SQLite`-backed repository for macros configurations.
pub struct SqliteMacrosRepository {
    pool: SqlitePool,
}

impl SqliteMacrosRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl MacrosRepository for SqliteMacrosRepository {
    fn get_all(&self) -> impl Future<Output = Result<Vec<MacrosConfig>, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }

    fn upsert(
        &self,
        config: MacrosConfig,
    ) -> impl Future<Output = Result<MacrosConfig, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            sqlx::query(UPSERT)
                .bind(config.id.as_uuid())
                .bind(&config.kind)
                .bind(&config.name)
                .bind(&config.description)
                .bind(json::encode(&config.labels)?)
                .bind(json::encode(&config.settings)?)
                .bind(json::encode(&config.state)?)
                .bind(time::now().to_rfc3339())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(config)
        }
    }

    fn delete(&self, id: MacrosId) -> impl Future<Output = Result<(), HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let result = sqlx::query(DELETE)
                .bind(id.as_uuid())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            if result.rows_affected() == 0 {
                tracing::debug!(macros_id = %id, "no macros row to delete");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;

    async fn setup() -> SqliteMacrosRepository {
        let db = Config {
            database_url: "sqlite::memory:".to_string(),
        }
        .build()
        .await
        .unwrap();
        SqliteMacrosRepository::new(db.pool().clone())
    }

    fn hall() -> MacrosConfig {
        MacrosConfig::builder()
            .kind("LIGHTING")
            .name("Hall")
            .description("Hall ceiling")
            .label("ground-floor")
            .settings(serde_json::json!({
                "buttons": [{ "control": "wb-gpio/A1" }],
                "lightings": ["wb-mr6cu_21/K1"],
            }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_upsert_and_load_config() {
        let repo = setup().await;
        let config = hall();

        let stored = repo.upsert(config.clone()).await.unwrap();
        assert_eq!(stored, config);

        let all = repo.get_all().await.unwrap();
        assert_eq!(all, vec![config]);
    }

    #[tokio::test]
    async fn should_replace_state_on_second_upsert() {
        let repo = setup().await;
        let mut config = hall();
        repo.upsert(config.clone()).await.unwrap();

        config.state = serde_json::json!({"switch": "ON"});
        repo.upsert(config.clone()).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, serde_json::json!({"switch": "ON"}));
    }

    #[tokio::test]
    async fn should_load_configs_in_creation_order() {
        let repo = setup().await;
        let first = hall();
        let second = MacrosConfig::builder().kind("LIGHTING").name("Kitchen").build().unwrap();
        repo.upsert(first.clone()).await.unwrap();
        repo.upsert(second.clone()).await.unwrap();

        let ids: Vec<MacrosId> = repo.get_all().await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn should_delete_config() {
        let repo = setup().await;
        let config = hall();
        repo.upsert(config.clone()).await.unwrap();

        repo.delete(config.id).await.unwrap();
        assert!(repo.get_all().await.unwrap().is_empty());

        // unknown ids are a no-op
        repo.delete(MacrosId::new()).await.unwrap();
    }
}
