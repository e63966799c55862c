//! Shared PostgreSQL integration-test infrastructure: one containerized
//! server per test run, one throwaway database per test.

use std::sync::OnceLock;

use postgres::{Client, NoTls};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use uuid::Uuid;

const PG_USER: &str = "postgres";
const PG_PASSWORD: &str = "postgres";
const PG_DB: &str = "postgres";

// The runtime is kept alive for the duration of the test run so the
// container it manages stays up.
static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
static PORT: OnceLock<u16> = OnceLock::new();

fn postgres_port() -> u16 {
    *PORT.get_or_init(|| {
        let rt = RUNTIME
            .get_or_init(|| tokio::runtime::Runtime::new().expect("failed to create tokio runtime"));
        rt.block_on(async {
            let container = Postgres::default()
                .start()
                .await
                .expect("failed to start postgres container");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("failed to get postgres port");
            // Keep the container alive for the whole test run.
            std::mem::forget(container);
            port
        })
    })
}

fn url(db: &str) -> String {
    format!("postgres://{}:{}@127.0.0.1:{}/{}", PG_USER, PG_PASSWORD, postgres_port(), db)
}

/// A client connected to a freshly created, uniquely named database.
pub fn fresh_client() -> Client {
    let mut admin = Client::connect(&url(PG_DB), NoTls).expect("failed to connect as admin");
    let db_name = format!("test_{}", Uuid::new_v4().simple());
    admin
        .execute(&format!("CREATE DATABASE \"{db_name}\""), &[])
        .expect("failed to create test database");
    drop(admin);

    Client::connect(&url(&db_name), NoTls).expect("failed to connect to test database")
}
