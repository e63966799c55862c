//! Creation of new, empty migration files from templates.

use std::fs;
use std::path::PathBuf;

use crate::error::Error;
use crate::migrator::Migrator;
use crate::naming;
use crate::{MAX_VERSION, MIN_VERSION};

/// Which kind of migration file to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationType {
    /// A `.sql` file with Up/Down directive scaffolding.
    Sql,
    /// A `.rs` file with registration scaffolding.
    Rust,
}

impl MigrationType {
    fn ext(self) -> &'static str {
        match self {
            MigrationType::Sql => naming::SQL_EXT,
            MigrationType::Rust => naming::CODE_EXT,
        }
    }

    fn default_template(self) -> &'static str {
        match self {
            MigrationType::Sql => SQL_TEMPLATE,
            MigrationType::Rust => RUST_TEMPLATE,
        }
    }
}

const SQL_TEMPLATE: &str = "\
-- +gander Up
-- +gander StatementBegin
SELECT 'up SQL query';
-- +gander StatementEnd

-- +gander Down
-- +gander StatementBegin
SELECT 'down SQL query';
-- +gander StatementEnd
";

const RUST_TEMPLATE: &str = r#"//! {camel_name} migration.

use gander::{DbTx, Error};

pub fn register() {
    gander::register_migration!(up, down);
}

fn up(tx: &mut dyn DbTx) -> Result<(), Error> {
    // This code is executed when the migration is applied.
    Ok(())
}

fn down(tx: &mut dyn DbTx) -> Result<(), Error> {
    // This code is executed when the migration is rolled back.
    Ok(())
}
"#;

impl Migrator {
    /// Write a new blank migration file into the migration directory, using
    /// the default template for `migration_type`.
    ///
    /// The version prefix is a wall-clock timestamp, or the next sequential
    /// number when the migrator was configured with
    /// [`with_sequential_versions`](Migrator::with_sequential_versions).
    /// Returns the path of the created file.
    pub fn create(&self, name: &str, migration_type: MigrationType) -> Result<PathBuf, Error> {
        self.create_with_template(name, migration_type, migration_type.default_template())
    }

    /// Like [`create`](Migrator::create), with a caller-supplied template.
    ///
    /// `{version}` and `{camel_name}` in the template are substituted.
    pub fn create_with_template(
        &self,
        name: &str,
        migration_type: MigrationType,
        template: &str,
    ) -> Result<PathBuf, Error> {
        let version = if self.sequential_versions() {
            // Allocation inspects the directory through the real filesystem:
            // creating a file is a modifying operation, whatever fs the
            // collector was configured with.
            let existing = crate::collect::collect_migrations(
                &crate::collect::OsFs,
                self.dir(),
                &self.registry_snapshot(),
                MIN_VERSION,
                MAX_VERSION,
            )?;
            let next = existing.sequential().last().map(|m| m.version + 1).unwrap_or(1);
            naming::format_sequential(next)
        } else {
            naming::timestamp_version()
        };

        let filename =
            format!("{}_{}.{}", version, naming::snake_case(name), migration_type.ext());
        let path = self.dir().join(filename);
        if path.exists() {
            return Err(Error::Generic(format!(
                "failed to create migration file: {} already exists",
                path.display()
            )));
        }

        let contents = template
            .replace("{version}", &version)
            .replace("{camel_name}", &naming::camel_case(name));
        fs::write(&path, contents)?;

        #[cfg(feature = "tracing")]
        tracing::info!(path = %path.display(), "created new migration file");

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;

    fn migrator(dir: &tempfile::TempDir) -> Migrator {
        Migrator::new(dir.path()).with_registry(Registry::new())
    }

    #[test]
    fn creates_a_timestamped_sql_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = migrator(&dir).create("Add Users", MigrationType::Sql).unwrap();

        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(filename.ends_with("_add_users.sql"));
        // 14-digit timestamp prefix.
        assert_eq!(filename.split('_').next().unwrap().len(), 14);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("-- +gander Up"));
        assert!(contents.contains("-- +gander Down"));
    }

    #[test]
    fn sequential_mode_continues_from_the_highest_sequential_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("00001_a.sql"), "-- +gander Up\nSELECT 1;\n").unwrap();
        fs::write(dir.path().join("00002_b.sql"), "-- +gander Up\nSELECT 1;\n").unwrap();
        // Timestamped files are ignored by sequential allocation.
        fs::write(dir.path().join("20220310121530_c.sql"), "-- +gander Up\nSELECT 1;\n").unwrap();

        let m = migrator(&dir).with_sequential_versions(true);
        let path = m.create("add likes", MigrationType::Sql).unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "00003_add_likes.sql");
    }

    #[test]
    fn sequential_mode_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let m = migrator(&dir).with_sequential_versions(true);
        let path = m.create("init", MigrationType::Sql).unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "00001_init.sql");
    }

    #[test]
    fn refuses_to_overwrite_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("00001_init.sql"), "-- +gander Up\nSELECT 1;\n").unwrap();
        // A file the collector ignores (a test helper) already occupies the
        // name the allocator is about to hand out.
        fs::write(dir.path().join("00002_smoke_test.rs"), "").unwrap();

        let m = migrator(&dir).with_sequential_versions(true);
        let err = m.create("smoke test", MigrationType::Rust).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn rust_template_substitutes_the_camel_name() {
        let dir = tempfile::tempdir().unwrap();
        let m = migrator(&dir).with_sequential_versions(true);
        let path = m.create("add users", MigrationType::Rust).unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "00001_add_users.rs");

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("AddUsers migration."));
        assert!(contents.contains("register_migration!(up, down)"));
    }

    #[test]
    fn custom_templates_substitute_the_version() {
        let dir = tempfile::tempdir().unwrap();
        let m = migrator(&dir).with_sequential_versions(true);
        let path = m
            .create_with_template("probe", MigrationType::Sql, "-- migration {version}: {camel_name}\n")
            .unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "-- migration 00001: Probe\n");
    }
}
