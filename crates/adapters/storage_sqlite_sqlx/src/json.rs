//! JSON text columns.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::error::StorageError;

/// Read a TEXT column holding JSON.
pub(crate) fn column<T: DeserializeOwned>(row: &SqliteRow, name: &str) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(name)?;
    serde_json::from_str(&raw).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}
