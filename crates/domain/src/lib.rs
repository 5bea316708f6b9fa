//! # wbhub-domain
//!
//! Pure domain model for the wbhub home automation hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **hardware fragments** (partial, single-message views of a device
//!   or control, every field optional)
//! - Define **canonical devices and controls** (the authoritative snapshot)
//!   and the field-merge rule that folds fragments into them
//! - Define **history entries** (control value/error transitions)
//! - Define **macros configurations** (persisted automation rule settings)
//! - Define **events** carried by the in-process bus
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod device;
pub mod event;
pub mod hardware;
pub mod history;
pub mod macros;
