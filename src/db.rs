//! The database capability consumed by the engine.
//!
//! The engine borrows a live connection for the duration of one operation; it
//! never acquires, pools, or retains connections itself. Each backend module
//! (`sqlite`, `postgres`, `mysql`) implements [`Database`] for its concrete
//! connection type, so a `rusqlite::Connection` or `postgres::Client` can be
//! handed to the migrator directly.

use crate::error::Error;
use crate::migration::MigrationRecord;

/// A statement executor inside an open transaction.
///
/// Transactional code migrations receive this capability; everything they
/// execute commits or rolls back together with the ledger update.
pub trait DbTx {
    /// Execute a single SQL statement.
    fn execute(&mut self, sql: &str) -> Result<(), Error>;
}

/// A live database connection.
pub trait Database {
    /// Execute a single SQL statement outside any transaction.
    fn execute(&mut self, sql: &str) -> Result<(), Error>;

    /// Run `body` inside a transaction. The transaction commits when `body`
    /// returns `Ok` and rolls back when it returns `Err`.
    fn run_tx(
        &mut self,
        body: &mut dyn FnMut(&mut dyn DbTx) -> Result<(), Error>,
    ) -> Result<(), Error>;

    /// Execute a ledger query selecting `(version_id, is_applied, tstamp)`
    /// and return the rows in statement order.
    fn query_records(&mut self, sql: &str) -> Result<Vec<MigrationRecord>, Error>;
}
