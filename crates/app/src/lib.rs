//! # wbhub-app
//!
//! Application layer: the reconciliation engine and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `HardwareRepository`: upsert & load canonical devices and controls
//!   - `HistoryRepository`: batched append of control history
//!   - `MacrosRepository`: upsert, load & delete macros configurations
//!   - `EventPublisher`: publish side of the in-process bus
//! - Run the ingestion pipeline behind a single actor (`Hub`):
//!   - `Decoder`: wire topic & payload into a hardware fragment
//!   - `DeviceReconciler`: fragment into the canonical world, with a diff
//!   - `HistoryRecorder`: de-duplicated, batched history
//!   - `MacrosEngine`: fan canonical updates out to automation rules
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `wbhub-domain` only (plus `tokio` for channels, timers and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod config;
pub mod decoder;
pub mod event_bus;
mod flush;
pub mod history_recorder;
pub mod hub;
pub mod macros;
pub mod macros_engine;
pub mod ports;
pub mod reconciler;

#[cfg(test)]
mod testing;
