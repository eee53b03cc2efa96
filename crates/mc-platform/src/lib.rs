//! Memcard Platform
//!
//! Thin adapters over the record-server platform:
//! - Record store interface with SQLite and in-memory backends
//! - Typed record-created hooks
//! - Run-once migrations, including the initial superuser seed
//! - The `job_requests` record API

pub mod api;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod seed;
pub mod sqlite;
pub mod store;

pub use error::PlatformError;
pub use hooks::HookRegistry;
pub use memory::InMemoryStore;
pub use migrations::{Migration, MigrationRunner};
pub use seed::{InitialSuperusersMigration, INITIAL_SUPERUSERS_MIGRATION};
pub use sqlite::SqliteStore;
pub use store::{MigrationLedger, RecordStore};
