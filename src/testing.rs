//! Testing utilities for migration development.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::collect::MigrationFs;
use crate::error::Error;

/// An in-memory migration filesystem.
///
/// Useful for exercising a [`Migrator`](crate::Migrator) without touching
/// disk, or for shipping migration SQL embedded in a binary:
///
/// ```
/// use gander::testing::MemoryFs;
/// use gander::{Migrator, Registry};
///
/// let fs = MemoryFs::new().with_file(
///     "migrations/00001_users.sql",
///     "-- +gander Up\nCREATE TABLE users (id INTEGER PRIMARY KEY);\n",
/// );
/// let migrator = Migrator::new("migrations")
///     .with_fs(Box::new(fs))
///     .with_registry(Registry::new());
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryFs {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, builder-style. Parent directories are implied.
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Add a file.
    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl MigrationFs for MemoryFs {
    fn dir_exists(&self, dir: &Path) -> bool {
        self.files.keys().any(|p| p.starts_with(dir))
    }

    fn list_files(&self, dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Error> {
        Ok(self
            .files
            .keys()
            .filter(|p| {
                p.parent() == Some(dir) && p.extension().and_then(|s| s.to_str()) == Some(ext)
            })
            .cloned()
            .collect())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, Error> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Generic(format!("{}: no such file", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_direct_children_with_the_extension() {
        let fs = MemoryFs::new()
            .with_file("migrations/00001_a.sql", "")
            .with_file("migrations/00002_b.rs", "")
            .with_file("migrations/nested/00003_c.sql", "")
            .with_file("elsewhere/00004_d.sql", "");

        assert!(fs.dir_exists(Path::new("migrations")));
        assert!(!fs.dir_exists(Path::new("missing")));

        let sql = fs.list_files(Path::new("migrations"), "sql").unwrap();
        assert_eq!(sql, vec![PathBuf::from("migrations/00001_a.sql")]);

        let code = fs.list_files(Path::new("migrations"), "rs").unwrap();
        assert_eq!(code, vec![PathBuf::from("migrations/00002_b.rs")]);
    }

    #[test]
    fn reads_known_files_and_rejects_unknown_ones() {
        let fs = MemoryFs::new().with_file("m/00001_a.sql", "SELECT 1;");
        assert_eq!(fs.read_to_string(Path::new("m/00001_a.sql")).unwrap(), "SELECT 1;");
        assert!(fs.read_to_string(Path::new("m/00009_z.sql")).is_err());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn drives_a_full_migration_run_in_memory() {
        use crate::{Migrator, Registry};
        use rusqlite::Connection;

        let fs = MemoryFs::new()
            .with_file(
                "migrations/00001_users.sql",
                "-- +gander Up\nCREATE TABLE users (id INTEGER PRIMARY KEY);\n\n\
                 -- +gander Down\nDROP TABLE users;\n",
            )
            .with_file(
                "migrations/00002_repos.sql",
                "-- +gander Up\nCREATE TABLE repos (id INTEGER PRIMARY KEY);\n\n\
                 -- +gander Down\nDROP TABLE repos;\n",
            );

        let migrator = Migrator::new("migrations")
            .with_fs(Box::new(fs))
            .with_registry(Registry::new());
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(migrator.up(&mut conn).unwrap(), vec![1, 2]);
        assert_eq!(migrator.version(&mut conn).unwrap(), 2);
        assert_eq!(migrator.reset(&mut conn).unwrap(), vec![2, 1]);
    }
}
