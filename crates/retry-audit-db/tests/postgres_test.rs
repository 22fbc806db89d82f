//! Runs against the PostgreSQL server described by the libpq environment
//! variables: `cargo test -p retry-audit-db -- --ignored`.

use retry_audit_db::probe::{self, ProbeOptions};
use retry_audit_db::{ConnectionConfig, CounterTable, DbConnection, DriverKind, OpenOptions};

async fn probe_postgres(driver: DriverKind) {
    let config = ConnectionConfig::from_env().unwrap();
    let connection = DbConnection::open(driver, &config, &OpenOptions::default())
        .await
        .unwrap();
    let name = format!("retry_audit_{}", driver.as_str().replace('-', "_"));
    let table = CounterTable::new(name, "n");

    let report = probe::run_probe(
        &connection,
        &table,
        &ProbeOptions::default().with_update_count(100),
    )
    .await
    .unwrap();

    assert_eq!(report.executed, 100);
    assert_eq!(report.reported_errors, 0);
    assert_eq!(report.actual_updates, 100);
    connection.close().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn test_tokio_postgres_probe() {
    probe_postgres(DriverKind::TokioPostgres).await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn test_sqlx_probe() {
    probe_postgres(DriverKind::Sqlx).await;
}

#[tokio::test]
async fn test_unreachable_server_fails_to_open() {
    let config = ConnectionConfig::new("127.0.0.1", "nobody", "unused")
        .with_port(1)
        .with_connect_timeout(std::time::Duration::from_secs(2));

    for driver in DriverKind::DEFAULT_PAIR {
        let result = DbConnection::open(driver, &config, &OpenOptions::default()).await;
        assert!(result.is_err(), "{driver} should not connect to port 1");
    }
}
