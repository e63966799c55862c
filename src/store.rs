//! Dialect-specific bookkeeping SQL and the ledger store built on it.

use crate::db::{Database, DbTx};
use crate::error::Error;
use crate::migration::MigrationRecord;

/// Default name of the version ledger table.
pub const DEFAULT_TABLE_NAME: &str = "gander_db_version";

/// Produces the bookkeeping SQL for one database dialect.
///
/// Implementations are pure SQL-string factories. Adding a dialect means
/// adding one implementation; nothing else in the engine branches on dialect
/// names.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// SQL creating the ledger table.
    fn create_version_table_sql(&self, table: &str) -> String;
    /// SQL inserting an applied row for `version`.
    fn insert_version_sql(&self, table: &str, version: i64) -> String;
    /// SQL deleting every row for `version`.
    fn delete_version_sql(&self, table: &str, version: i64) -> String;
    /// SQL selecting all ledger rows, most recent first.
    fn list_migrations_sql(&self, table: &str) -> String;
    /// SQL selecting the most recent row for `version`.
    fn get_migration_sql(&self, table: &str, version: i64) -> String;
}

/// Look up a dialect by its common names.
pub fn dialect_named(name: &str) -> Result<Box<dyn Dialect>, Error> {
    match name {
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteDialect)),
        "postgres" | "pgx" => Ok(Box::new(PostgresDialect)),
        "mysql" | "tidb" => Ok(Box::new(MysqlDialect)),
        other => Err(Error::Generic(format!("{other:?}: unknown dialect"))),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version_id INTEGER NOT NULL,
                is_applied INTEGER NOT NULL,
                tstamp TIMESTAMP DEFAULT (datetime('now'))
            );"
        )
    }

    fn insert_version_sql(&self, table: &str, version: i64) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES ({version}, 1);")
    }

    fn delete_version_sql(&self, table: &str, version: i64) -> String {
        format!("DELETE FROM {table} WHERE version_id={version};")
    }

    fn list_migrations_sql(&self, table: &str) -> String {
        format!("SELECT version_id, is_applied, tstamp FROM {table} ORDER BY id DESC")
    }

    fn get_migration_sql(&self, table: &str, version: i64) -> String {
        format!(
            "SELECT version_id, is_applied, tstamp FROM {table} \
             WHERE version_id={version} ORDER BY id DESC LIMIT 1"
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (
                id serial NOT NULL,
                version_id bigint NOT NULL,
                is_applied boolean NOT NULL,
                tstamp timestamp NULL default now(),
                PRIMARY KEY(id)
            );"
        )
    }

    fn insert_version_sql(&self, table: &str, version: i64) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES ({version}, true);")
    }

    fn delete_version_sql(&self, table: &str, version: i64) -> String {
        format!("DELETE FROM {table} WHERE version_id={version};")
    }

    fn list_migrations_sql(&self, table: &str) -> String {
        format!("SELECT version_id, is_applied, tstamp FROM {table} ORDER BY id DESC")
    }

    fn get_migration_sql(&self, table: &str, version: i64) -> String {
        format!(
            "SELECT version_id, is_applied, tstamp FROM {table} \
             WHERE version_id={version} ORDER BY id DESC LIMIT 1"
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (
                id serial NOT NULL,
                version_id bigint NOT NULL,
                is_applied boolean NOT NULL,
                tstamp timestamp NULL default now(),
                PRIMARY KEY(id)
            );"
        )
    }

    fn insert_version_sql(&self, table: &str, version: i64) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES ({version}, true);")
    }

    fn delete_version_sql(&self, table: &str, version: i64) -> String {
        format!("DELETE FROM {table} WHERE version_id={version};")
    }

    fn list_migrations_sql(&self, table: &str) -> String {
        format!("SELECT version_id, is_applied, tstamp FROM {table} ORDER BY id DESC")
    }

    fn get_migration_sql(&self, table: &str, version: i64) -> String {
        format!(
            "SELECT version_id, is_applied, tstamp FROM {table} \
             WHERE version_id={version} ORDER BY id DESC LIMIT 1"
        )
    }
}

/// Ledger operations for a chosen dialect and table name.
pub(crate) struct Store {
    dialect: Box<dyn Dialect>,
    table: String,
}

impl Store {
    pub fn new(dialect: Box<dyn Dialect>, table: impl Into<String>) -> Self {
        Self { dialect, table: table.into() }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn set_table(&mut self, table: impl Into<String>) {
        self.table = table.into();
    }

    pub fn set_dialect(&mut self, dialect: Box<dyn Dialect>) {
        self.dialect = dialect;
    }

    pub fn create_version_table(&self, tx: &mut dyn DbTx) -> Result<(), Error> {
        tx.execute(&self.dialect.create_version_table_sql(&self.table))
    }

    pub fn insert_version(&self, tx: &mut dyn DbTx, version: i64) -> Result<(), Error> {
        tx.execute(&self.dialect.insert_version_sql(&self.table, version))
    }

    pub fn insert_version_no_tx(&self, db: &mut dyn Database, version: i64) -> Result<(), Error> {
        db.execute(&self.dialect.insert_version_sql(&self.table, version))
    }

    pub fn delete_version(&self, tx: &mut dyn DbTx, version: i64) -> Result<(), Error> {
        tx.execute(&self.dialect.delete_version_sql(&self.table, version))
    }

    pub fn delete_version_no_tx(&self, db: &mut dyn Database, version: i64) -> Result<(), Error> {
        db.execute(&self.dialect.delete_version_sql(&self.table, version))
    }

    /// All ledger rows, most recent (highest id) first.
    pub fn list_migrations(&self, db: &mut dyn Database) -> Result<Vec<MigrationRecord>, Error> {
        db.query_records(&self.dialect.list_migrations_sql(&self.table))
    }

    /// The most recent ledger row for `version`, if any.
    pub fn get_migration(
        &self,
        db: &mut dyn Database,
        version: i64,
    ) -> Result<Option<MigrationRecord>, Error> {
        let rows = db.query_records(&self.dialect.get_migration_sql(&self.table, version))?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_lookup_by_common_names() {
        assert!(dialect_named("sqlite").is_ok());
        assert!(dialect_named("sqlite3").is_ok());
        assert!(dialect_named("postgres").is_ok());
        assert!(dialect_named("pgx").is_ok());
        assert!(dialect_named("mysql").is_ok());
        let err = dialect_named("oracle").unwrap_err();
        assert!(err.to_string().contains("unknown dialect"));
    }

    #[test]
    fn sql_strings_use_the_configured_table() {
        let store = Store::new(Box::new(PostgresDialect), "my_versions");
        assert_eq!(store.table(), "my_versions");

        let d = PostgresDialect;
        assert!(d.create_version_table_sql("my_versions").contains("CREATE TABLE my_versions"));
        assert_eq!(
            d.insert_version_sql("my_versions", 7),
            "INSERT INTO my_versions (version_id, is_applied) VALUES (7, true);"
        );
        assert_eq!(d.delete_version_sql("my_versions", 7), "DELETE FROM my_versions WHERE version_id=7;");
        assert!(d.list_migrations_sql("my_versions").ends_with("ORDER BY id DESC"));
        assert!(d.get_migration_sql("my_versions", 7).contains("WHERE version_id=7"));
    }

    #[cfg(feature = "sqlite")]
    mod sqlite_backed {
        use super::*;
        use crate::db::Database;
        use rusqlite::Connection;

        fn store() -> Store {
            Store::new(Box::new(SqliteDialect), DEFAULT_TABLE_NAME)
        }

        fn bootstrap(conn: &mut Connection, store: &Store) {
            let db: &mut dyn Database = conn;
            db.run_tx(&mut |tx| {
                store.create_version_table(tx)?;
                store.insert_version(tx, 0)
            })
            .unwrap();
        }

        #[test]
        fn insert_list_and_get_follow_row_id_recency() {
            let mut conn = Connection::open_in_memory().unwrap();
            let store = store();
            bootstrap(&mut conn, &store);

            let db: &mut dyn Database = &mut conn;
            db.run_tx(&mut |tx| {
                store.insert_version(tx, 1)?;
                store.insert_version(tx, 2)
            })
            .unwrap();

            let rows = store.list_migrations(db).unwrap();
            let versions: Vec<i64> = rows.iter().map(|r| r.version_id).collect();
            assert_eq!(versions, vec![2, 1, 0]);
            assert!(rows.iter().all(|r| r.is_applied));
            assert!(rows.iter().all(|r| r.tstamp.is_some()));

            let latest = store.get_migration(db, 2).unwrap().unwrap();
            assert_eq!(latest.version_id, 2);
            assert!(latest.is_applied);
            assert!(store.get_migration(db, 9).unwrap().is_none());
        }

        #[test]
        fn delete_version_removes_every_row() {
            let mut conn = Connection::open_in_memory().unwrap();
            let store = store();
            bootstrap(&mut conn, &store);

            let db: &mut dyn Database = &mut conn;
            store.insert_version_no_tx(db, 3).unwrap();
            store.insert_version_no_tx(db, 3).unwrap();
            store.delete_version_no_tx(db, 3).unwrap();

            assert!(store.get_migration(db, 3).unwrap().is_none());
            let rows = store.list_migrations(db).unwrap();
            assert_eq!(rows.len(), 1); // bootstrap row only
        }
    }
}
