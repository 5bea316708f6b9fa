//! Storage port: persistence for canonical state, history and macros.
//!
//! Writes are idempotent upserts keyed by natural identifiers, so a flush
//! can be retried or repeated without duplicating rows.

use std::future::Future;
use std::sync::Arc;

use wbhub_domain::device::{Control, Device};
use wbhub_domain::error::HubError;
use wbhub_domain::history::HistoryEntry;
use wbhub_domain::id::MacrosId;
use wbhub_domain::macros::MacrosConfig;

/// Persistence for canonical devices and controls.
pub trait HardwareRepository {
    /// Upsert device rows by device id. The `controls` list of each device is
    /// ignored; controls are written through [`upsert_controls`](Self::upsert_controls).
    fn upsert_devices(
        &self,
        devices: Vec<Device>,
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Upsert control rows by `(device_id, control_id)`.
    fn upsert_controls(
        &self,
        controls: Vec<Control>,
    ) -> impl Future<Output = Result<(), HubError>> + Send;

    /// Load every persisted device, with an empty control list.
    fn get_all_devices(&self) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send;

    /// Load every persisted control.
    fn get_all_controls(&self) -> impl Future<Output = Result<Vec<Control>, HubError>> + Send;
}

/// Append-only persistence for control history.
pub trait HistoryRepository {
    /// Append a batch of entries, returning how many were written.
    fn append_many(
        &self,
        entries: Vec<HistoryEntry>,
    ) -> impl Future<Output = Result<usize, HubError>> + Send;
}

/// Persistence for macros configurations.
pub trait MacrosRepository {
    /// Load every persisted configuration.
    fn get_all(&self) -> impl Future<Output = Result<Vec<MacrosConfig>, HubError>> + Send;

    /// Create or replace the configuration with the same id.
    fn upsert(
        &self,
        config: MacrosConfig,
    ) -> impl Future<Output = Result<MacrosConfig, HubError>> + Send;

    /// Delete the configuration with the given id.
    fn delete(&self, id: MacrosId) -> impl Future<Output = Result<(), HubError>> + Send;
}

impl<T: HardwareRepository + Send + Sync> HardwareRepository for Arc<T> {
    fn upsert_devices(
        &self,
        devices: Vec<Device>,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        (**self).upsert_devices(devices)
    }

    fn upsert_controls(
        &self,
        controls: Vec<Control>,
    ) -> impl Future<Output = Result<(), HubError>> + Send {
        (**self).upsert_controls(controls)
    }

    fn get_all_devices(&self) -> impl Future<Output = Result<Vec<Device>, HubError>> + Send {
        (**self).get_all_devices()
    }

    fn get_all_controls(&self) -> impl Future<Output = Result<Vec<Control>, HubError>> + Send {
        (**self).get_all_controls()
    }
}

impl<T: HistoryRepository + Send + Sync> HistoryRepository for Arc<T> {
    fn append_many(
        &self,
        entries: Vec<HistoryEntry>,
    ) -> impl Future<Output = Result<usize, HubError>> + Send {
        (**self).append_many(entries)
    }
}

impl<T: MacrosRepository + Send + Sync> MacrosRepository for Arc<T> {
    fn get_all(&self) -> impl Future<Output = Result<Vec<MacrosConfig>, HubError>> + Send {
        (**self).get_all()
    }

    fn upsert(
        &self,
        config: MacrosConfig,
    ) -> impl Future<Output = Result<MacrosConfig, HubError>> + Send {
        (**self).upsert(config)
    }

    fn delete(&self, id: MacrosId) -> impl Future<Output = Result<(), HubError>> + Send {
        (**self).delete(id)
    }
}
