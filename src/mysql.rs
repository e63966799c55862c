//! MySQL support via the [`mysql`](https://crates.io/crates/mysql) crate.
//!
//! # MySQL DDL behavior
//!
//! In MySQL, DDL statements (`CREATE TABLE`, `ALTER TABLE`, `DROP TABLE`,
//! ...) cause an implicit commit and cannot be rolled back. A transactional
//! migration that fails partway through may therefore leave earlier DDL
//! applied, while its ledger row is not written; fix the migration and
//! re-run.
//!
//! Practical guidance for MySQL migrations:
//!
//! 1. Keep migrations small and focused; fewer statements mean less partial
//!    state on failure.
//! 2. Make them idempotent (`IF EXISTS` / `IF NOT EXISTS`) so re-runs
//!    converge.
//! 3. Put risky DML before DDL; data changes are still transactional.

use chrono::{DateTime, NaiveDate, Utc};
use mysql::prelude::Queryable;
use mysql::{Conn, TxOpts, Value};

use crate::db::{Database, DbTx};
use crate::error::Error;
use crate::migration::MigrationRecord;

// Re-export the driver types migration code commonly needs.
pub use mysql::Conn as MysqlConn;
pub use mysql::Transaction as MysqlTransaction;

impl DbTx for mysql::Transaction<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.query_drop(sql)?;
        Ok(())
    }
}

impl Database for Conn {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.query_drop(sql)?;
        Ok(())
    }

    fn run_tx(
        &mut self,
        body: &mut dyn FnMut(&mut dyn DbTx) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut tx = self.start_transaction(TxOpts::default())?;
        // The transaction rolls back on drop unless committed; DDL inside it
        // may already have been implicitly committed by the server.
        body(&mut tx)?;
        tx.commit()?;
        Ok(())
    }

    fn query_records(&mut self, sql: &str) -> Result<Vec<MigrationRecord>, Error> {
        let rows: Vec<mysql::Row> = self.query(sql)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let version_id: i64 = row
                .get(0)
                .ok_or_else(|| Error::Mysql("ledger row is missing version_id".to_string()))?;
            let is_applied: bool = row
                .get(1)
                .ok_or_else(|| Error::Mysql("ledger row is missing is_applied".to_string()))?;
            let tstamp: Option<Value> = row.get(2);
            records.push(MigrationRecord {
                version_id,
                is_applied,
                tstamp: tstamp.and_then(timestamp_from_value),
            });
        }
        Ok(records)
    }
}

fn timestamp_from_value(value: Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))?
                .and_hms_micro_opt(u32::from(hour), u32::from(minute), u32::from(second), micros)
                .map(|t| t.and_utc())
        }
        _ => None,
    }
}
