//! SQLite support via the [`rusqlite`](https://crates.io/crates/rusqlite)
//! crate.
//!
//! SQLite fully supports transactional DDL: when a transactional migration
//! fails, everything it did (including the ledger update) rolls back,
//! leaving the database at the last successful migration.
//!
//! ```no_run
//! use gander::Migrator;
//! use rusqlite::Connection;
//!
//! let mut conn = Connection::open("app.db").unwrap();
//! Migrator::new("migrations").up(&mut conn).unwrap();
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::db::{Database, DbTx};
use crate::error::Error;
use crate::migration::MigrationRecord;

// Re-export the driver types migration code commonly needs.
pub use rusqlite::Connection as SqliteConnection;
pub use rusqlite::Transaction as SqliteTransaction;

impl DbTx for rusqlite::Transaction<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.execute_batch(sql)?;
        Ok(())
    }
}

impl Database for Connection {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.execute_batch(sql)?;
        Ok(())
    }

    fn run_tx(
        &mut self,
        body: &mut dyn FnMut(&mut dyn DbTx) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut tx = self.transaction()?;
        // The transaction rolls back on drop unless committed.
        body(&mut tx)?;
        tx.commit()?;
        Ok(())
    }

    fn query_records(&mut self, sql: &str) -> Result<Vec<MigrationRecord>, Error> {
        let mut stmt = self.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (version_id, is_applied, tstamp) = row?;
            records.push(MigrationRecord {
                version_id,
                is_applied,
                tstamp: tstamp.as_deref().and_then(parse_timestamp),
            });
        }
        Ok(records)
    }
}

/// `datetime('now')` stores `YYYY-MM-DD HH:MM:SS` in UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok().map(|t| t.and_utc())
}
