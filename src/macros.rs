//! Convenience macros for registering migrations.

/// Register a transactional Rust migration under the current file's name.
///
/// `file!()` supplies the source path, so the registering file itself must
/// follow the `<version>_<name>.rs` convention. Both arguments are functions
/// (or closures) of type `fn(&mut dyn DbTx) -> Result<(), Error>`.
///
/// ```ignore
/// // in migrations/00002_add_owners.rs
/// pub fn register() {
///     gander::register_migration!(up, down);
/// }
///
/// fn up(tx: &mut dyn gander::DbTx) -> Result<(), gander::Error> {
///     tx.execute("ALTER TABLE repos ADD COLUMN owner TEXT")
/// }
///
/// fn down(tx: &mut dyn gander::DbTx) -> Result<(), gander::Error> {
///     tx.execute("ALTER TABLE repos DROP COLUMN owner")
/// }
/// ```
///
/// A migration with only one direction registers the other as `None` through
/// [`add_migration`](crate::add_migration) directly.
#[macro_export]
macro_rules! register_migration {
    ($up:expr, $down:expr) => {
        $crate::add_migration(
            file!(),
            Some(::std::sync::Arc::new($up) as $crate::TxMigrationFn),
            Some(::std::sync::Arc::new($down) as $crate::TxMigrationFn),
        )
    };
}

/// Register a non-transactional Rust migration under the current file's name.
///
/// The functions receive the raw connection; nothing they do can be rolled
/// back, and the ledger is updated in a separate statement afterwards.
#[macro_export]
macro_rules! register_migration_no_tx {
    ($up:expr, $down:expr) => {
        $crate::add_migration_no_tx(
            file!(),
            Some(::std::sync::Arc::new($up) as $crate::NoTxMigrationFn),
            Some(::std::sync::Arc::new($down) as $crate::NoTxMigrationFn),
        )
    };
}
