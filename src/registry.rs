//! In-process registry of code-backed migrations.
//!
//! Rust migrations are functions compiled into the migrating binary. Host
//! code registers them during startup, before the first migrator call:
//! either in an explicit [`Registry`] handed to the migrator, or in the
//! process-wide default registry via [`add_migration`] /
//! [`add_migration_no_tx`] (usually through the
//! [`register_migration!`](crate::register_migration) macros).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use crate::error::Error;
use crate::migration::{Migration, NoTxMigrationFn, Payload, TxMigrationFn};
use crate::naming;

/// A set of code-backed migrations keyed by version.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    migrations: BTreeMap<i64, Migration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transactional migration. The version is parsed from
    /// `source`, which must follow the `<version>_<name>.rs` convention.
    ///
    /// Panics on a bad source name or a version conflict; registration
    /// mistakes are programming errors and should fail the host process.
    /// Use [`Registry::try_add_migration`] for a non-panicking variant.
    pub fn add_migration(
        &mut self,
        source: impl Into<PathBuf>,
        up: Option<TxMigrationFn>,
        down: Option<TxMigrationFn>,
    ) {
        if let Err(err) = self.try_add_migration(source, up, down) {
            panic!("{err}");
        }
    }

    /// Non-panicking form of [`Registry::add_migration`].
    pub fn try_add_migration(
        &mut self,
        source: impl Into<PathBuf>,
        up: Option<TxMigrationFn>,
        down: Option<TxMigrationFn>,
    ) -> Result<(), Error> {
        self.insert_payload(source.into(), Payload::Code { up, down })
    }

    /// Register a migration that runs outside a transaction.
    ///
    /// Panics on a bad source name or a version conflict.
    pub fn add_migration_no_tx(
        &mut self,
        source: impl Into<PathBuf>,
        up: Option<NoTxMigrationFn>,
        down: Option<NoTxMigrationFn>,
    ) {
        if let Err(err) = self.try_add_migration_no_tx(source, up, down) {
            panic!("{err}");
        }
    }

    /// Non-panicking form of [`Registry::add_migration_no_tx`].
    pub fn try_add_migration_no_tx(
        &mut self,
        source: impl Into<PathBuf>,
        up: Option<NoTxMigrationFn>,
        down: Option<NoTxMigrationFn>,
    ) -> Result<(), Error> {
        self.insert_payload(source.into(), Payload::CodeNoTx { up, down })
    }

    fn insert_payload(&mut self, source: PathBuf, payload: Payload) -> Result<(), Error> {
        let version = naming::numeric_component(&source).map_err(|e| {
            Error::Generic(format!("failed to register migration {}: {}", source.display(), e))
        })?;
        if let Some(existing) = self.migrations.get(&version) {
            return Err(Error::Generic(format!(
                "failed to register migration {}: version {} conflicts with {}",
                source.display(),
                version,
                existing.source.display()
            )));
        }
        self.migrations.insert(
            version,
            Migration { version, source, next: None, previous: None, payload },
        );
        Ok(())
    }

    pub fn contains(&self, version: i64) -> bool {
        self.migrations.contains_key(&version)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }
}

fn global() -> &'static Mutex<Registry> {
    static GLOBAL: OnceLock<Mutex<Registry>> = OnceLock::new();
    GLOBAL.get_or_init(|| Mutex::new(Registry::new()))
}

fn with_global<T>(f: impl FnOnce(&mut Registry) -> T) -> T {
    let mut guard = global().lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard)
}

/// Register a transactional migration in the process-wide registry.
///
/// Panics on a bad source name or a version conflict. Registration must
/// complete before the first migrator call.
pub fn add_migration(
    source: impl Into<PathBuf>,
    up: Option<TxMigrationFn>,
    down: Option<TxMigrationFn>,
) {
    with_global(|r| r.add_migration(source, up, down));
}

/// Non-panicking form of [`add_migration`].
pub fn try_add_migration(
    source: impl Into<PathBuf>,
    up: Option<TxMigrationFn>,
    down: Option<TxMigrationFn>,
) -> Result<(), Error> {
    with_global(|r| r.try_add_migration(source, up, down))
}

/// Register a non-transactional migration in the process-wide registry.
///
/// Panics on a bad source name or a version conflict.
pub fn add_migration_no_tx(
    source: impl Into<PathBuf>,
    up: Option<NoTxMigrationFn>,
    down: Option<NoTxMigrationFn>,
) {
    with_global(|r| r.add_migration_no_tx(source, up, down));
}

/// Non-panicking form of [`add_migration_no_tx`].
pub fn try_add_migration_no_tx(
    source: impl Into<PathBuf>,
    up: Option<NoTxMigrationFn>,
    down: Option<NoTxMigrationFn>,
) -> Result<(), Error> {
    with_global(|r| r.try_add_migration_no_tx(source, up, down))
}

/// A copy of the process-wide registry, taken at collection time.
pub(crate) fn global_snapshot() -> Registry {
    with_global(|r| r.clone())
}
