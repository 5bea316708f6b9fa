//! # wbhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `wbhub-app::ports::storage`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `wbhub-app` (for port traits) and `wbhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod hardware_repo;
pub mod history_repo;
mod json;
pub mod macros_repo;
pub mod pool;

pub use hardware_repo::SqliteHardwareRepository;
pub use history_repo::SqliteHistoryRepository;
pub use macros_repo::SqliteMacrosRepository;
pub use pool::{Config, Database};
