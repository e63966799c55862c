//! Execution of a single migration in one direction.

use std::time::{Duration, Instant};

use crate::collect::MigrationFs;
use crate::db::Database;
use crate::error::Error;
use crate::migration::{Direction, Migration, NoTxMigrationFn, Payload, TxMigrationFn};
use crate::sqlparser;
use crate::store::Store;

/// Observability callbacks owned by the migrator and fired by the runner.
#[derive(Default)]
pub(crate) struct Hooks {
    pub on_start: Option<Box<dyn Fn(i64, &str) + Send + Sync>>,
    pub on_complete: Option<Box<dyn Fn(i64, &str, Duration) + Send + Sync>>,
    pub on_skipped: Option<Box<dyn Fn(i64, &str) + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(i64, &str, &Error) + Send + Sync>>,
}

// Manual Debug since closures don't implement Debug.
impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_skipped", &self.on_skipped.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Runs one migration at a time against a borrowed connection.
pub(crate) struct Runner<'a> {
    pub store: &'a Store,
    pub fs: &'a dyn MigrationFs,
    pub hooks: &'a Hooks,
    /// False when the caller opted out of ledger updates for this run.
    pub record_version: bool,
}

impl Runner<'_> {
    pub fn run(
        &self,
        db: &mut dyn Database,
        migration: &Migration,
        direction: Direction,
    ) -> Result<(), Error> {
        let name = migration.source_name();

        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "migration",
            version = migration.version,
            source = %name,
            direction = direction.label()
        )
        .entered();

        if let Some(ref callback) = self.hooks.on_start {
            callback(migration.version, &name);
        }

        let start = Instant::now();
        match self.dispatch(db, migration, direction) {
            Ok(empty) => {
                let elapsed = truncate_duration(start.elapsed());

                #[cfg(feature = "tracing")]
                if empty {
                    tracing::info!(duration = ?elapsed, "EMPTY");
                } else {
                    tracing::info!(duration = ?elapsed, "OK");
                }

                if empty {
                    if let Some(ref callback) = self.hooks.on_skipped {
                        callback(migration.version, &name);
                    }
                }
                if let Some(ref callback) = self.hooks.on_complete {
                    callback(migration.version, &name, elapsed);
                }
                Ok(())
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %error, "migration failed");

                if let Some(ref callback) = self.hooks.on_error {
                    callback(migration.version, &name, &error);
                }
                Err(error)
            }
        }
    }

    /// Returns whether the migration was empty (no statements, or a missing
    /// direction function). Empty migrations do no work but still move the
    /// ledger.
    fn dispatch(
        &self,
        db: &mut dyn Database,
        migration: &Migration,
        direction: Direction,
    ) -> Result<bool, Error> {
        let name = migration.source_name();
        match &migration.payload {
            Payload::Sql => {
                let contents = self.fs.read_to_string(&migration.source).map_err(|e| {
                    Error::Generic(format!("{name}: failed to open SQL migration file: {e}"))
                })?;
                let (statements, use_tx) =
                    sqlparser::parse_sql_migration(&contents, direction).map_err(|e| {
                        Error::Generic(format!("{name}: failed to parse SQL migration file: {e}"))
                    })?;
                let empty = statements.is_empty();
                self.run_sql(db, &statements, use_tx, migration.version, direction)
                    .map_err(|e| {
                        Error::Generic(format!("{name}: failed to run SQL migration: {e}"))
                    })?;
                Ok(empty)
            }
            Payload::Code { up, down } => {
                let function = match direction {
                    Direction::Up => up.as_ref(),
                    Direction::Down => down.as_ref(),
                };
                let empty = function.is_none();
                self.run_code_tx(db, function, migration.version, direction).map_err(|e| {
                    Error::Generic(format!("{name}: failed to run migration function: {e}"))
                })?;
                Ok(empty)
            }
            Payload::CodeNoTx { up, down } => {
                let function = match direction {
                    Direction::Up => up.as_ref(),
                    Direction::Down => down.as_ref(),
                };
                let empty = function.is_none();
                self.run_code_no_tx(db, function, migration.version, direction).map_err(|e| {
                    Error::Generic(format!("{name}: failed to run migration function: {e}"))
                })?;
                Ok(empty)
            }
            Payload::UnregisteredCode => Err(Error::Generic(format!(
                "{}: Rust migration functions must be registered and compiled into the \
                 migrating binary; register them during startup with gander::add_migration \
                 or the register_migration! macro",
                migration.source.display()
            ))),
        }
    }

    fn run_sql(
        &self,
        db: &mut dyn Database,
        statements: &[String],
        use_tx: bool,
        version: i64,
        direction: Direction,
    ) -> Result<(), Error> {
        if use_tx {
            let store = self.store;
            let record_version = self.record_version;
            db.run_tx(&mut |tx| {
                for query in statements {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(statement = %sqlparser::clean_statement(query), "executing statement");

                    tx.execute(query).map_err(|e| {
                        Error::Generic(format!(
                            "failed to execute SQL query {:?}: {}",
                            sqlparser::clean_statement(query),
                            e
                        ))
                    })?;
                }
                if record_version {
                    match direction {
                        Direction::Up => store.insert_version(tx, version).map_err(|e| {
                            Error::Generic(format!("failed to insert new version row: {e}"))
                        })?,
                        Direction::Down => store.delete_version(tx, version).map_err(|e| {
                            Error::Generic(format!("failed to delete version row: {e}"))
                        })?,
                    }
                }
                Ok(())
            })?;
            return Ok(());
        }

        // No transaction. A failure here leaves the database partially
        // migrated with no ledger row for this version.
        for query in statements {
            #[cfg(feature = "tracing")]
            tracing::debug!(statement = %sqlparser::clean_statement(query), "executing statement");

            db.execute(query).map_err(|e| {
                Error::Generic(format!(
                    "failed to execute SQL query {:?}: {}",
                    sqlparser::clean_statement(query),
                    e
                ))
            })?;
        }
        if self.record_version {
            match direction {
                Direction::Up => self.store.insert_version_no_tx(db, version)?,
                Direction::Down => self.store.delete_version_no_tx(db, version)?,
            }
        }
        Ok(())
    }

    fn run_code_tx(
        &self,
        db: &mut dyn Database,
        function: Option<&TxMigrationFn>,
        version: i64,
        direction: Direction,
    ) -> Result<(), Error> {
        if function.is_none() && !self.record_version {
            return Ok(());
        }
        let store = self.store;
        let record_version = self.record_version;
        db.run_tx(&mut |tx| {
            if let Some(function) = function {
                function(tx)?;
            }
            if record_version {
                match direction {
                    Direction::Up => store.insert_version(tx, version)?,
                    Direction::Down => store.delete_version(tx, version)?,
                }
            }
            Ok(())
        })
    }

    fn run_code_no_tx(
        &self,
        db: &mut dyn Database,
        function: Option<&NoTxMigrationFn>,
        version: i64,
        direction: Direction,
    ) -> Result<(), Error> {
        if let Some(function) = function {
            function(db)?;
        }
        // The user work above is already committed; if the ledger update
        // below fails, the database has been mutated without being recorded.
        // No compensating action is attempted.
        if self.record_version {
            match direction {
                Direction::Up => self.store.insert_version_no_tx(db, version)?,
                Direction::Down => self.store.delete_version_no_tx(db, version)?,
            }
        }
        Ok(())
    }
}

/// Round a duration down to two significant digits of its leading unit, for
/// human-friendly reporting.
pub(crate) fn truncate_duration(d: Duration) -> Duration {
    for unit in [Duration::from_secs(1), Duration::from_millis(1), Duration::from_micros(1)] {
        if d > unit {
            let step = (unit / 100).as_nanos();
            let truncated = d.as_nanos() / step * step;
            return Duration::from_nanos(truncated as u64);
        }
    }
    d
}
