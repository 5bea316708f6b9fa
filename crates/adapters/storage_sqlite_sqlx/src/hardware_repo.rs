//! `SQLite` implementation of [`HardwareRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use wbhub_app::ports::HardwareRepository;
use wbhub_domain::device::{Control, Device};
use wbhub_domain::error::HubError;
use wbhub_domain::hardware::ControlType;
use wbhub_domain::time;

use crate::error::StorageError;
use crate::json;

/// Wrapper for converting database rows into domain [`Device`].
struct DeviceRow(Device);

impl<'r> FromRow<'r, SqliteRow> for DeviceRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Device {
            id: row.try_get("id")?,
            driver: row.try_get("driver")?,
            title: json::column(row, "title")?,
            error: json::column(row, "error")?,
            meta: json::column(row, "meta")?,
            labels: json::column(row, "labels")?,
            markup: json::column(row, "markup")?,
            controls: Vec::new(),
        }))
    }
}

/// Wrapper for converting database rows into domain [`Control`].
struct ControlRow(Control);

impl<'r> FromRow<'r, SqliteRow> for ControlRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("type")?;
        Ok(Self(Control {
            device_id: row.try_get("device_id")?,
            id: row.try_get("control_id")?,
            title: json::column(row, "title")?,
            order: row.try_get("sort_order")?,
            readonly: row.try_get("readonly")?,
            kind: ControlType::from(kind),
            units: row.try_get("units")?,
            max: row.try_get("max")?,
            min: row.try_get("min")?,
            precision: row.try_get("precision")?,
            value: row.try_get("value")?,
            topic: row.try_get("topic")?,
            error: row.try_get("error")?,
            meta: json::column(row, "meta")?,
            labels: json::column(row, "labels")?,
            markup: json::column(row, "markup")?,
        }))
    }
}

const UPSERT_DEVICE: &str = r"
    INSERT INTO devices (id, driver, title, error, meta, labels, markup, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (id) DO UPDATE SET
        driver = excluded.driver,
        title = excluded.title,
        error = excluded.error,
        meta = excluded.meta,
        labels = excluded.labels,
        markup = excluded.markup,
        updated_at = excluded.updated_at
";

const UPSERT_CONTROL: &str = r"
    INSERT INTO controls (
        device_id, control_id, title, sort_order, type, readonly, units, max, min,
        precision, value, topic, error, meta, labels, markup, updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (device_id, control_id) DO UPDATE SET
        title = excluded.title,
        sort_order = excluded.sort_order,
        type = excluded.type,
        readonly = excluded.readonly,
        units = excluded.units,
        max = excluded.max,
        min = excluded.min,
        precision = excluded.precision,
        value = excluded.value,
        topic = excluded.topic,
        error = excluded.error,
        meta = excluded.meta,
        labels = excluded.labels,
        markup = excluded.markup,
        updated_at = excluded.updated_at
";

const SELECT_DEVICES: &str = "SELECT * FROM devices ORDER BY id";
const SELECT_CONTROLS: &str = "SELECT * FROM controls ORDER BY device_id, sort_order, control_id";

/// `SQLite`-backed repository for canonical devices and controls.
pub struct SqliteHardwareRepository {
    pool: SqlitePool,
}

impl SqliteHardwareRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl HardwareRepository for SqliteHardwareRepository {
    fn upsert_devices(
        &self,
        devices: Vec<Device>,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let updated_at = time::now().to_rfc3339();
            let mut tx = pool.begin().await.map_err(StorageError::from)?;
            for device in &devices {
                sqlx::query(UPSERT_DEVICE)
                    .bind(&device.id)
                    .bind(&device.driver)
                    .bind(json::encode(&device.title)?)
                    .bind(json::encode(&device.error)?)
                    .bind(json::encode(&device.meta)?)
                    .bind(json::encode(&device.labels)?)
                    .bind(json::encode(&device.markup)?)
                    .bind(&updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
            }
            tx.commit().await.map_err(StorageError::from)?;
            tracing::trace!(count = devices.len(), "devices upserted");
            Ok(())
        }
    }

    fn upsert_controls(
        &self,
        controls: Vec<Control>,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let updated_at = time::now().to_rfc3339();
            let mut tx = pool.begin().await.map_err(StorageError::from)?;
            for control in &controls {
                sqlx::query(UPSERT_CONTROL)
                    .bind(&control.device_id)
                    .bind(&control.id)
                    .bind(json::encode(&control.title)?)
                    .bind(control.order)
                    .bind(control.kind.as_str())
                    .bind(control.readonly)
                    .bind(&control.units)
                    .bind(control.max)
                    .bind(control.min)
                    .bind(control.precision)
                    .bind(&control.value)
                    .bind(&control.topic)
                    .bind(&control.error)
                    .bind(json::encode(&control.meta)?)
                    .bind(json::encode(&control.labels)?)
                    .bind(json::encode(&control.markup)?)
                    .bind(&updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::from)?;
            }
            tx.commit().await.map_err(StorageError::from)?;
            tracing::trace!(count = controls.len(), "controls upserted");
            Ok(())
        }
    }

    fn get_all_devices(&self) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<DeviceRow> = sqlx::query_as(SELECT_DEVICES)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }

    fn get_all_controls(&self) -> impl Future<Output = Result<Vec<Control>, HubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<ControlRow> = sqlx::query_as(SELECT_CONTROLS)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }
}
