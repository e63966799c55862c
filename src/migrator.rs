//! The migration orchestrator.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::collect::{self, MigrationFs, OsFs};
use crate::db::Database;
use crate::error::Error;
use crate::migration::{Direction, Migration, Migrations};
use crate::registry::{self, Registry};
use crate::runner::{Hooks, Runner};
use crate::store::{Dialect, SqliteDialect, Store, DEFAULT_TABLE_NAME};
use crate::{MAX_VERSION, MIN_VERSION};

/// Status of one collected migration against the ledger.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MigrationStatus {
    pub version: i64,
    pub source: PathBuf,
    /// When the migration was last applied; `None` means pending.
    pub applied_at: Option<DateTime<Utc>>,
}

/// The entrypoint for bringing a database schema to a requested state.
///
/// A `Migrator` reads versioned migrations from a directory (and the code
/// registry), compares them against the version ledger in the target
/// database, and applies or reverts them in order. Construct one per
/// migration directory and configure it builder-style:
///
/// ```no_run
/// # #[cfg(feature = "sqlite")] {
/// use gander::Migrator;
/// use rusqlite::Connection;
///
/// let migrator = Migrator::new("migrations")
///     .with_table_name("schema_versions")
///     .on_migration_complete(|version, source, took| {
///         eprintln!("OK   {source} ({took:?})  [{version}]");
///     });
///
/// let mut conn = Connection::open("app.db").unwrap();
/// migrator.up(&mut conn).unwrap();
/// # }
/// ```
///
/// The migrator borrows the connection for the duration of one call and
/// assumes it is the only migrator running against the database; callers
/// serialize externally (deployment pipelines, advisory locks).
pub struct Migrator {
    dir: PathBuf,
    fs: Box<dyn MigrationFs>,
    store: Store,
    registry: Option<Registry>,
    sequential: bool,
    allow_missing: bool,
    no_versioning: bool,
    hooks: Hooks,
}

// Manual Debug since hooks hold closures.
impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("dir", &self.dir)
            .field("table_name", &self.store.table())
            .field("sequential", &self.sequential)
            .field("allow_missing", &self.allow_missing)
            .field("no_versioning", &self.no_versioning)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Migrator {
    /// Create a migrator reading migrations from `dir`, with the sqlite
    /// dialect and the default ledger table name.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fs: Box::new(OsFs),
            store: Store::new(Box::new(SqliteDialect), DEFAULT_TABLE_NAME),
            registry: None,
            sequential: false,
            allow_missing: false,
            no_versioning: false,
            hooks: Hooks::default(),
        }
    }

    /// Use a specific dialect for the bookkeeping SQL.
    pub fn with_dialect(mut self, dialect: Box<dyn Dialect>) -> Self {
        self.store.set_dialect(dialect);
        self
    }

    /// Select the dialect by name (`"sqlite"`, `"postgres"`, `"mysql"` and
    /// their aliases). Fails fast on an unknown name.
    pub fn with_dialect_named(self, name: &str) -> Result<Self, Error> {
        Ok(self.with_dialect(crate::store::dialect_named(name)?))
    }

    /// Set a custom name for the version ledger table.
    /// Defaults to `"gander_db_version"`.
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.store.set_table(name);
        self
    }

    /// Read migration files through a custom filesystem capability instead of
    /// the process filesystem.
    pub fn with_fs(mut self, fs: Box<dyn MigrationFs>) -> Self {
        self.fs = fs;
        self
    }

    /// Use an explicit code-migration registry instead of the process-wide
    /// default.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Allocate sequential versions (`00001`, `00002`, ...) instead of
    /// timestamps when creating new migration files.
    pub fn with_sequential_versions(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    /// Permit out-of-order migrations: files whose version predates the
    /// newest applied version are applied first (ascending) instead of
    /// failing the run. Off by default.
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }

    /// Run migrations without recording them in the ledger. The database
    /// keeps no memory of what ran; use for ad-hoc or throwaway schemas.
    pub fn no_versioning(mut self, skip: bool) -> Self {
        self.no_versioning = skip;
        self
    }

    /// Set a callback invoked when a migration starts.
    /// Receives the version and source file name.
    pub fn on_migration_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(i64, &str) + Send + Sync + 'static,
    {
        self.hooks.on_start = Some(Box::new(callback));
        self
    }

    /// Set a callback invoked when a migration completes successfully.
    /// Receives the version, source file name, and elapsed time.
    pub fn on_migration_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(i64, &str, Duration) + Send + Sync + 'static,
    {
        self.hooks.on_complete = Some(Box::new(callback));
        self
    }

    /// Set a callback invoked when a migration turns out to be empty (no
    /// statements for the direction, or no registered function).
    pub fn on_migration_skipped<F>(mut self, callback: F) -> Self
    where
        F: Fn(i64, &str) + Send + Sync + 'static,
    {
        self.hooks.on_skipped = Some(Box::new(callback));
        self
    }

    /// Set a callback invoked when a migration fails.
    pub fn on_migration_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(i64, &str, &Error) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Box::new(callback));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_name(&self) -> &str {
        self.store.table()
    }

    pub(crate) fn sequential_versions(&self) -> bool {
        self.sequential
    }

    pub(crate) fn registry_snapshot(&self) -> Registry {
        match &self.registry {
            Some(registry) => registry.clone(),
            None => registry::global_snapshot(),
        }
    }

    pub(crate) fn collect(&self, current: i64, target: i64) -> Result<Migrations, Error> {
        collect::collect_migrations(
            self.fs.as_ref(),
            &self.dir,
            &self.registry_snapshot(),
            current,
            target,
        )
    }

    fn runner(&self) -> Runner<'_> {
        Runner {
            store: &self.store,
            fs: self.fs.as_ref(),
            hooks: &self.hooks,
            record_version: !self.no_versioning,
        }
    }

    /// Apply all pending migrations. Returns the versions applied, in order.
    pub fn up(&self, db: &mut dyn Database) -> Result<Vec<i64>, Error> {
        self.up_internal(db, MAX_VERSION, false)
    }

    /// Apply pending migrations up to and including `target`.
    pub fn up_to(&self, db: &mut dyn Database, target: i64) -> Result<Vec<i64>, Error> {
        self.up_internal(db, target, false)
    }

    /// Apply exactly the next pending migration.
    ///
    /// Returns [`Error::NoNextVersion`] when there is nothing left to apply.
    pub fn up_by_one(&self, db: &mut dyn Database) -> Result<i64, Error> {
        let applied = self.up_internal(db, MAX_VERSION, true)?;
        applied.first().copied().ok_or(Error::NoNextVersion)
    }

    fn up_internal(
        &self,
        db: &mut dyn Database,
        target: i64,
        by_one: bool,
    ) -> Result<Vec<i64>, Error> {
        let found = self.collect(MIN_VERSION, target)?;

        if self.no_versioning {
            return self.up_no_versioning(db, &found, target, by_one);
        }

        self.ensure_db_version(db)?;
        let applied_versions = self.list_ledger_versions(db)?;
        let missing = find_missing(&applied_versions, &found);

        if !missing.is_empty() && !self.allow_missing {
            let listing: Vec<String> = missing
                .iter()
                .map(|m| format!("version {}: {}", m.version, m.source.display()))
                .collect();
            return Err(Error::Generic(format!(
                "found {} missing (out-of-order) migrations:\n\t{}",
                missing.len(),
                listing.join("\n\t")
            )));
        }

        if self.allow_missing {
            return self.up_with_missing(db, &missing, &found, &applied_versions, by_one);
        }

        let runner = self.runner();
        let mut run = Vec::new();
        loop {
            let current = self.ensure_db_version(db)?;
            let next = match found.next(current) {
                Ok(migration) => migration,
                Err(Error::NoNextVersion) => break,
                Err(e) => {
                    return Err(Error::Generic(format!("failed to find next migration: {e}")))
                }
            };
            runner.run(db, next, Direction::Up)?;
            run.push(next.version);
            if by_one {
                return Ok(run);
            }
        }

        #[cfg(feature = "tracing")]
        {
            let current = self.ensure_db_version(db)?;
            tracing::info!(current_version = current, "no migrations to run");
        }
        if by_one {
            return Err(Error::NoNextVersion);
        }
        Ok(run)
    }

    /// Apply migrations without touching the ledger. `up_by_one` in this mode
    /// re-applies the first collected migration.
    fn up_no_versioning(
        &self,
        db: &mut dyn Database,
        migrations: &Migrations,
        target: i64,
        by_one: bool,
    ) -> Result<Vec<i64>, Error> {
        let target = match (by_one, migrations.iter().next()) {
            (true, Some(first)) => first.version,
            (_, None) => return Ok(Vec::new()),
            (false, Some(_)) => target,
        };

        let runner = self.runner();
        let mut run = Vec::new();
        for migration in migrations.iter() {
            if migration.version > target {
                break;
            }
            runner.run(db, migration, Direction::Up)?;
            run.push(migration.version);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(file_version = run.last().copied().unwrap_or(0), "up to file version");
        Ok(run)
    }

    /// Out-of-order migrations are applied first, ascending, then the
    /// remaining new migrations. Once missing migrations are in play the
    /// ledger cursor is no longer sequential, so the second pass goes by set
    /// membership instead of next-version.
    fn up_with_missing(
        &self,
        db: &mut dyn Database,
        missing: &[&Migration],
        found: &Migrations,
        applied_versions: &[i64],
        by_one: bool,
    ) -> Result<Vec<i64>, Error> {
        let mut applied: HashSet<i64> = applied_versions.iter().copied().collect();
        let runner = self.runner();
        let mut run = Vec::new();

        for migration in missing {
            runner.run(db, migration, Direction::Up)?;
            run.push(migration.version);
            if by_one {
                return Ok(run);
            }
            let current = self.ensure_db_version(db)?;
            if current != migration.version {
                return Err(Error::Generic(format!(
                    "missing migration {} does not match current db version {}",
                    migration.version, current
                )));
            }
            applied.insert(current);
        }

        for migration in found.iter() {
            if applied.contains(&migration.version) {
                continue;
            }
            runner.run(db, migration, Direction::Up)?;
            run.push(migration.version);
            if by_one {
                return Ok(run);
            }
        }

        #[cfg(feature = "tracing")]
        {
            let current = self.ensure_db_version(db)?;
            tracing::info!(current_version = current, "no migrations to run");
        }
        if by_one {
            return Err(Error::NoNextVersion);
        }
        Ok(run)
    }

    /// Roll back the most recently applied migration.
    ///
    /// In no-versioning mode only the newest file migration is reverted.
    pub fn down(&self, db: &mut dyn Database) -> Result<Vec<i64>, Error> {
        let migrations = self.collect(MIN_VERSION, MAX_VERSION)?;
        if self.no_versioning {
            let Ok(last) = migrations.last() else {
                return Ok(Vec::new());
            };
            return self.down_no_versioning(db, &migrations, last.version - 1);
        }

        let current = self.ensure_db_version(db)?;
        let migration = migrations.current(current)?;
        self.runner().run(db, migration, Direction::Down)?;
        Ok(vec![migration.version])
    }

    /// Roll back migrations in descending order until the ledger version is
    /// at most `target`.
    pub fn down_to(&self, db: &mut dyn Database, target: i64) -> Result<Vec<i64>, Error> {
        let migrations = self.collect(MIN_VERSION, MAX_VERSION)?;
        if self.no_versioning {
            return self.down_no_versioning(db, &migrations, target);
        }

        let runner = self.runner();
        let mut run = Vec::new();
        loop {
            let current = self.ensure_db_version(db)?;
            if current == 0 {
                break;
            }
            let migration = match migrations.current(current) {
                Ok(migration) => migration,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(
                        version = current,
                        "no migration file for current version, nothing to roll back"
                    );
                    break;
                }
            };
            if migration.version <= target {
                break;
            }
            runner.run(db, migration, Direction::Down)?;
            run.push(migration.version);
        }
        Ok(run)
    }

    fn down_no_versioning(
        &self,
        db: &mut dyn Database,
        migrations: &Migrations,
        target: i64,
    ) -> Result<Vec<i64>, Error> {
        let runner = self.runner();
        let mut run = Vec::new();
        for migration in migrations.iter().rev() {
            if migration.version <= target {
                break;
            }
            runner.run(db, migration, Direction::Down)?;
            run.push(migration.version);
        }
        Ok(run)
    }

    /// Roll back the current migration and immediately reapply it.
    pub fn redo(&self, db: &mut dyn Database) -> Result<i64, Error> {
        let migrations = self.collect(MIN_VERSION, MAX_VERSION)?;
        let migration = if self.no_versioning {
            migrations.last()?
        } else {
            let current = self.ensure_db_version(db)?;
            migrations.current(current)?
        };

        let runner = self.runner();
        runner.run(db, migration, Direction::Down)?;
        runner.run(db, migration, Direction::Up)?;
        Ok(migration.version)
    }

    /// Roll back every applied migration.
    ///
    /// In no-versioning mode this is equivalent to `down_to(0)`.
    pub fn reset(&self, db: &mut dyn Database) -> Result<Vec<i64>, Error> {
        if self.no_versioning {
            return self.down_to(db, MIN_VERSION);
        }

        let migrations = self.collect(MIN_VERSION, MAX_VERSION)?;
        let statuses = self
            .applied_statuses(db)
            .map_err(|e| Error::Generic(format!("failed to get status of migrations: {e}")))?;

        let runner = self.runner();
        let mut run = Vec::new();
        for migration in migrations.iter().rev() {
            if !statuses.get(&migration.version).copied().unwrap_or(false) {
                continue;
            }
            runner.run(db, migration, Direction::Down)?;
            run.push(migration.version);
        }
        Ok(run)
    }

    /// Applied/pending state for every collected migration, ascending.
    pub fn status(&self, db: &mut dyn Database) -> Result<Vec<MigrationStatus>, Error> {
        let migrations = self.collect(MIN_VERSION, MAX_VERSION)?;
        self.ensure_db_version(db)?;

        let mut out = Vec::with_capacity(migrations.len());
        for migration in migrations.iter() {
            let record = self.store.get_migration(db, migration.version)?;
            out.push(MigrationStatus {
                version: migration.version,
                source: migration.source.clone(),
                applied_at: record.filter(|r| r.is_applied).and_then(|r| r.tstamp),
            });
        }
        Ok(out)
    }

    /// The database's current migration version.
    ///
    /// In no-versioning mode this is the highest collected file version; the
    /// database is not consulted.
    pub fn version(&self, db: &mut dyn Database) -> Result<i64, Error> {
        if self.no_versioning {
            let migrations = self
                .collect(MIN_VERSION, MAX_VERSION)
                .map_err(|e| Error::Generic(format!("failed to collect migrations: {e}")))?;
            return Ok(migrations.last().map(|m| m.version).unwrap_or(0));
        }
        self.ensure_db_version(db)
    }

    /// Current ledger version, creating and bootstrapping the ledger table if
    /// it does not exist yet.
    ///
    /// Rows are scanned most recent first; the first version whose latest row
    /// is an up is the current version. Earlier rows for the same version are
    /// superseded.
    pub fn ensure_db_version(&self, db: &mut dyn Database) -> Result<i64, Error> {
        let records = match self.store.list_migrations(db) {
            Ok(records) => records,
            Err(_) => {
                // The ledger table does not exist yet.
                self.create_version_table(db)?;
                return Ok(0);
            }
        };

        let mut superseded: HashSet<i64> = HashSet::new();
        for record in records {
            if superseded.contains(&record.version_id) {
                continue;
            }
            if record.is_applied {
                return Ok(record.version_id);
            }
            superseded.insert(record.version_id);
        }
        Err(Error::NoNextVersion)
    }

    fn create_version_table(&self, db: &mut dyn Database) -> Result<(), Error> {
        #[cfg(feature = "tracing")]
        tracing::info!(table = self.store.table(), "creating version ledger table");

        let store = &self.store;
        db.run_tx(&mut |tx| {
            store.create_version_table(tx)?;
            store.insert_version(tx, 0)
        })
    }

    /// Every version mentioned in the ledger, ascending and deduplicated.
    fn list_ledger_versions(&self, db: &mut dyn Database) -> Result<Vec<i64>, Error> {
        let mut versions: Vec<i64> =
            self.store.list_migrations(db)?.into_iter().map(|r| r.version_id).collect();
        versions.sort_unstable();
        versions.dedup();
        Ok(versions)
    }

    /// Most recent applied/rolled-back state per ledger version.
    fn applied_statuses(&self, db: &mut dyn Database) -> Result<HashMap<i64, bool>, Error> {
        let mut results = HashMap::new();
        // Rows arrive most recent first; the first mention of a version wins.
        for record in self.store.list_migrations(db)? {
            results.entry(record.version_id).or_insert(record.is_applied);
        }
        Ok(results)
    }
}

/// Migrations on disk whose version predates the newest ledger version but
/// which were never applied themselves: out-of-order additions, typically
/// merged from another branch.
fn find_missing<'a>(ledger_versions: &[i64], found: &'a Migrations) -> Vec<&'a Migration> {
    let Some(&max) = ledger_versions.last() else {
        return Vec::new();
    };
    let known: HashSet<i64> = ledger_versions.iter().copied().collect();
    found.iter().filter(|m| m.version < max && !known.contains(&m.version)).collect()
}
