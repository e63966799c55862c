#![cfg_attr(docsrs, feature(doc_cfg))]
//! `gander` is a database schema migration engine: point it at a directory of
//! versioned migrations and a live connection, and it brings the schema from
//! its current applied state to a requested target state (up, down, to a
//! specific version, or by one step), recording progress in a bookkeeping
//! table so the process is resumable and auditable.
//!
//! # Concepts
//!
//! - Migrations live in one directory as `<version>_<name>.sql` files, or as
//!   Rust functions registered at startup under a `<version>_<name>.rs`
//!   source name. Versions are strictly positive integers: wall-clock
//!   timestamps (`20220310121530`) or zero-padded sequence numbers
//!   (`00001`).
//! - SQL files carry both directions, separated by `-- +gander Up` /
//!   `-- +gander Down` directive comments (see [`parse_sql_migration`]).
//! - Applied versions are recorded in a ledger table (default
//!   `gander_db_version`). The most recent row per version decides whether
//!   it is currently applied.
//! - The [`Migrator`] orchestrates everything and borrows your connection
//!   only for the duration of a call. Connections come from the driver
//!   crates directly; anything implementing [`Database`] works.
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "sqlite")] {
//! use gander::{Migrator, Registry};
//! use rusqlite::Connection;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::write(
//!     dir.path().join("00001_create_users.sql"),
//!     "-- +gander Up\nCREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\n\n\
//!      -- +gander Down\nDROP TABLE users;\n",
//! )
//! .unwrap();
//!
//! let migrator = Migrator::new(dir.path()).with_registry(Registry::new());
//! let mut conn = Connection::open_in_memory().unwrap();
//!
//! assert_eq!(migrator.up(&mut conn).unwrap(), vec![1]);
//! assert_eq!(migrator.version(&mut conn).unwrap(), 1);
//!
//! // Re-running is a no-op.
//! assert_eq!(migrator.up(&mut conn).unwrap(), Vec::<i64>::new());
//! # }
//! ```
//!
//! # Out-of-order migrations
//!
//! Merging a branch can introduce a migration whose version predates the
//! newest applied one. By default [`Migrator::up`] refuses to run and
//! enumerates the offenders; opt in with
//! [`allow_missing`](Migrator::allow_missing) to apply them first (in
//! ascending order) before the strictly-new migrations.
//!
//! # Database support
//!
//! | Feature | Driver | Notes |
//! |---------|--------|-------|
//! | `sqlite` (default) | `rusqlite` | transactional DDL |
//! | `postgres` | `postgres` | transactional DDL |
//! | `mysql` | `mysql` | DDL commits implicitly; see the module docs |
//!
//! Additional features: `tracing` (structured logging), `serde`
//! (`Serialize` on the read-model types), `testing` (an in-memory
//! filesystem for tests and embedded migrations).

mod collect;
mod create;
mod db;
mod error;
mod macros;
mod migration;
mod migrator;
mod naming;
mod registry;
mod runner;
mod sqlparser;
mod store;

pub use collect::{MigrationFs, OsFs};
pub use create::MigrationType;
pub use db::{Database, DbTx};
pub use error::Error;
pub use migration::{
    Direction, Migration, MigrationRecord, Migrations, NoTxMigrationFn, TxMigrationFn,
};
pub use migrator::{MigrationStatus, Migrator};
pub use naming::numeric_component;
pub use registry::{
    add_migration, add_migration_no_tx, try_add_migration, try_add_migration_no_tx, Registry,
};
pub use sqlparser::parse_sql_migration;
pub use store::{
    dialect_named, Dialect, MysqlDialect, PostgresDialect, SqliteDialect, DEFAULT_TABLE_NAME,
};

/// Maximum allowed migration version.
pub const MAX_VERSION: i64 = i64::MAX;
/// Lowest version bound; version 0 is reserved for the ledger bootstrap row.
pub const MIN_VERSION: i64 = 0;

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub mod mysql;

#[cfg(feature = "testing")]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

#[cfg(all(test, feature = "postgres"))]
pub(crate) mod test_postgres;
