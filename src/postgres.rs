//! PostgreSQL support via the
//! [`postgres`](https://crates.io/crates/postgres) crate.
//!
//! PostgreSQL fully supports transactional DDL. A failing transactional
//! migration rolls back completely, ledger update included; the database
//! stays at the last successful migration. The exceptions are
//! `CREATE/DROP DATABASE` and `CREATE/DROP TABLESPACE`, which cannot be
//! rolled back; avoid them in migrations, or mark the file
//! `-- +gander NO TRANSACTION`.
//!
//! ```no_run
//! use gander::{Migrator, PostgresDialect};
//! use postgres::{Client, NoTls};
//!
//! let mut client = Client::connect("postgres://app@localhost/app", NoTls).unwrap();
//! Migrator::new("migrations")
//!     .with_dialect(Box::new(PostgresDialect))
//!     .up(&mut client)
//!     .unwrap();
//! ```

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use postgres::Client;

use crate::db::{Database, DbTx};
use crate::error::Error;
use crate::migration::MigrationRecord;

// Re-export the driver types migration code commonly needs.
pub use postgres::Client as PostgresClient;
pub use postgres::Transaction as PostgresTransaction;

impl DbTx for postgres::Transaction<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.batch_execute(sql)?;
        Ok(())
    }
}

impl Database for Client {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.batch_execute(sql)?;
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
        let rows = self.query(sql, &[])?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let version_id: i64 = row.try_get(0)?;
            let is_applied: bool = row.try_get(1)?;
            let tstamp: Option<SystemTime> = row.try_get(2)?;
            records.push(MigrationRecord {
                version_id,
                is_applied,
                tstamp: tstamp.map(DateTime::<Utc>::from),
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_postgres::fresh_client;
    use crate::{Migrator, PostgresDialect, Registry};
    use std::fs;
    use std::path::Path;

    fn write_sql(dir: &Path, name: &str, table: &str) {
        fs::write(
            dir.join(name),
            format!(
                "-- +gander Up\nCREATE TABLE {table} (id bigserial PRIMARY KEY);\n\n\
                 -- +gander Down\nDROP TABLE {table};\n"
            ),
        )
        .unwrap();
    }

    fn migrator(dir: &tempfile::TempDir) -> Migrator {
        Migrator::new(dir.path())
            .with_dialect(Box::new(PostgresDialect))
            .with_registry(Registry::new())
    }

    #[test]
    fn up_down_cycle_against_a_live_server() {
        let mut client = fresh_client();
        let dir = tempfile::tempdir().unwrap();
        write_sql(dir.path(), "00001_users.sql", "users");
        write_sql(dir.path(), "00002_repos.sql", "repos");

        let m = migrator(&dir);
        assert_eq!(m.up(&mut client).unwrap(), vec![1, 2]);
        assert_eq!(m.version(&mut client).unwrap(), 2);

        let statuses = m.status(&mut client).unwrap();
        assert!(statuses.iter().all(|s| s.applied_at.is_some()));

        assert_eq!(m.down(&mut client).unwrap(), vec![2]);
        assert_eq!(m.version(&mut client).unwrap(), 1);

        assert_eq!(m.reset(&mut client).unwrap(), vec![1]);
        assert_eq!(m.version(&mut client).unwrap(), 0);
    }

    #[test]
    fn failing_migration_rolls_back_on_postgres() {
        let mut client = fresh_client();
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("00001_bad.sql"),
            "-- +gander Up\nCREATE TABLE x (id bigint);\nSELECT nope();\n",
        )
        .unwrap();

        let m = migrator(&dir);
        m.up(&mut client).unwrap_err();

        let exists: bool = client
            .query_one(
                "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = 'x')",
                &[],
            )
            .unwrap()
            .get(0);
        assert!(!exists);
        assert_eq!(m.version(&mut client).unwrap(), 0);
    }
}
