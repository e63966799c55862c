//! Discovery of migrations from a directory and the code registry.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::migration::{Migration, Migrations};
use crate::naming::{self, CODE_EXT, SQL_EXT};
use crate::registry::Registry;

/// Filesystem capability the collector reads migrations through.
///
/// Supplying an implementation lets callers collect from an embedded bundle
/// or a test harness instead of the process filesystem. See
/// [`OsFs`] and `testing::MemoryFs`.
pub trait MigrationFs: Send + Sync {
    /// Whether `dir` exists and is a directory.
    fn dir_exists(&self, dir: &Path) -> bool;
    /// Paths of the regular files directly inside `dir` whose extension is
    /// `ext`, in any order. Subdirectories are ignored.
    fn list_files(&self, dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Error>;
    /// Contents of the file at `path`.
    fn read_to_string(&self, path: &Path) -> Result<String, Error>;
}

/// The process filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl MigrationFs for OsFs {
    fn dir_exists(&self, dir: &Path) -> bool {
        dir.is_dir()
    }

    fn list_files(&self, dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Error> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some(ext) {
                out.push(path);
            }
        }
        Ok(out)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, Error> {
        Ok(fs::read_to_string(path)?)
    }
}

/// Whether `v` falls inside the migration window between `current` and
/// `target`: `(current, target]` going up, `(target, current]` going down,
/// empty when equal.
pub(crate) fn version_filter(v: i64, current: i64, target: i64) -> bool {
    if target > current {
        return v > current && v <= target;
    }
    if target < current {
        return v <= current && v > target;
    }
    false
}

/// Gather the migrations in `dir` and `registry` whose versions fall inside
/// the window, sorted ascending and linked.
pub(crate) fn collect_migrations(
    fs: &dyn MigrationFs,
    dir: &Path,
    registry: &Registry,
    current: i64,
    target: i64,
) -> Result<Migrations, Error> {
    if !fs.dir_exists(dir) {
        return Err(Error::Generic(format!("{} directory does not exist", dir.display())));
    }

    let mut migrations: Vec<Migration> = Vec::new();

    // SQL migration files.
    for file in fs.list_files(dir, SQL_EXT)? {
        let version = naming::numeric_component(&file).map_err(|e| {
            Error::Generic(format!("could not parse SQL migration file {}: {}", file.display(), e))
        })?;
        if version_filter(version, current, target) {
            migrations.push(Migration::sql(version, file));
        }
    }

    // Registered code migrations. Registration is authoritative whether or
    // not a sibling file exists on disk.
    for migration in registry.iter() {
        if version_filter(migration.version, current, target) {
            migrations.push(migration.clone());
        }
    }

    // Code migration files that were never registered. These carry no
    // runnable payload; the runner rejects them with a pointer to the
    // registration API.
    for file in fs.list_files(dir, CODE_EXT)? {
        let Ok(version) = naming::numeric_component(&file) else {
            // Not a migration file.
            continue;
        };
        let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem.ends_with("_test") {
            continue;
        }
        if registry.contains(version) {
            continue;
        }
        if version_filter(version, current, target) {
            migrations.push(Migration::unregistered_code(version, file));
        }
    }

    let mut set = Migrations(migrations);
    set.sort_and_connect();
    Ok(set)
}
