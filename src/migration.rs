//! Migration units, ledger records, and the ordered migration set.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::{Database, DbTx};
use crate::error::Error;
use crate::naming;

/// Direction of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply the migration.
    Up,
    /// Revert the migration.
    Down,
}

impl Direction {
    #[allow(dead_code)] // only read by the tracing spans
    pub(crate) fn label(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// A migration function run inside a transaction.
pub type TxMigrationFn = Arc<dyn Fn(&mut dyn DbTx) -> Result<(), Error> + Send + Sync>;

/// A migration function run on the raw connection, outside any transaction.
pub type NoTxMigrationFn = Arc<dyn Fn(&mut dyn Database) -> Result<(), Error> + Send + Sync>;

/// One row of the version ledger.
///
/// Multiple rows per version accumulate over time; the most recent row
/// (highest id) for a version is authoritative.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MigrationRecord {
    pub version_id: i64,
    /// Server-side insertion time.
    pub tstamp: Option<DateTime<Utc>>,
    /// True when the row was written by an up migration.
    pub is_applied: bool,
}

/// How a migration's work is expressed.
#[derive(Clone)]
pub(crate) enum Payload {
    /// A `.sql` file; contents are read when the migration runs.
    Sql,
    /// Registered Rust functions run inside one transaction together with the
    /// ledger update. Either direction may be absent.
    Code {
        up: Option<TxMigrationFn>,
        down: Option<TxMigrationFn>,
    },
    /// Registered Rust functions run on the raw connection; the ledger is
    /// updated separately afterwards.
    CodeNoTx {
        up: Option<NoTxMigrationFn>,
        down: Option<NoTxMigrationFn>,
    },
    /// A `.rs` file found on disk with no matching registration. Fails at
    /// run time with a pointer to the registration API.
    UnregisteredCode,
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Sql => "sql",
            Payload::Code { .. } => "code",
            Payload::CodeNoTx { .. } => "code-no-tx",
            Payload::UnregisteredCode => "unregistered-code",
        }
    }
}

/// A single unit of schema change.
#[derive(Clone)]
pub struct Migration {
    /// Strictly positive version parsed from the filename prefix.
    pub version: i64,
    /// Path of the `.sql` or `.rs` file this migration came from.
    pub source: PathBuf,
    /// Version of the following migration in the sorted set.
    pub next: Option<i64>,
    /// Version of the preceding migration in the sorted set.
    pub previous: Option<i64>,
    pub(crate) payload: Payload,
}

impl Migration {
    pub(crate) fn sql(version: i64, source: PathBuf) -> Self {
        Self { version, source, next: None, previous: None, payload: Payload::Sql }
    }

    pub(crate) fn unregistered_code(version: i64, source: PathBuf) -> Self {
        Self { version, source, next: None, previous: None, payload: Payload::UnregisteredCode }
    }

    /// File name used in diagnostics.
    pub(crate) fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

// Manual Debug since code payloads hold closures.
impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("source", &self.source)
            .field("kind", &self.payload.kind())
            .field("next", &self.next)
            .field("previous", &self.previous)
            .finish()
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.display())
    }
}

/// An ordered collection of migrations resolved for one operation.
#[derive(Debug, Default, Clone)]
pub struct Migrations(pub(crate) Vec<Migration>);

impl Migrations {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.0.iter()
    }

    /// The migration with exactly this version.
    pub fn current(&self, version: i64) -> Result<&Migration, Error> {
        self.iter().find(|m| m.version == version).ok_or(Error::NoCurrentVersion)
    }

    /// The first migration strictly after `current`.
    pub fn next(&self, current: i64) -> Result<&Migration, Error> {
        self.iter().find(|m| m.version > current).ok_or(Error::NoNextVersion)
    }

    /// The last migration strictly before `current`.
    pub fn previous(&self, current: i64) -> Result<&Migration, Error> {
        self.iter().rev().find(|m| m.version < current).ok_or(Error::NoNextVersion)
    }

    /// The highest-versioned migration of the set.
    pub fn last(&self) -> Result<&Migration, Error> {
        self.0.last().ok_or(Error::NoNextVersion)
    }

    /// Sort ascending by version and link each entry to its neighbors.
    ///
    /// Panics when two migrations share a version: that always means
    /// conflicting sources and there is no safe order to pick.
    pub(crate) fn sort_and_connect(&mut self) {
        self.0.sort_by_key(|m| m.version);
        for pair in self.0.windows(2) {
            if pair[0].version == pair[1].version {
                panic!(
                    "gander: duplicate migration version {} detected:\n{}\n{}",
                    pair[0].version,
                    pair[0].source.display(),
                    pair[1].source.display()
                );
            }
        }
        let versions: Vec<i64> = self.0.iter().map(|m| m.version).collect();
        for (i, m) in self.0.iter_mut().enumerate() {
            m.previous = if i > 0 { Some(versions[i - 1]) } else { None };
            m.next = versions.get(i + 1).copied();
        }
    }

    /// Subset whose versions do not read as timestamps. This partition only
    /// informs sequential version allocation; it is heuristic (a version is
    /// "timestamped" when it parses as `YYYYMMDDhhmmss` after the epoch).
    pub fn sequential(&self) -> Vec<&Migration> {
        self.iter().filter(|m| !naming::is_timestamp_version(m.version)).collect()
    }

    /// Subset whose versions read as timestamps after the epoch.
    pub fn timestamped(&self) -> Vec<&Migration> {
        self.iter().filter(|m| naming::is_timestamp_version(m.version)).collect()
    }
}

impl<'a> IntoIterator for &'a Migrations {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
