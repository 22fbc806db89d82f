//! # retry-audit-cli
//!
//! Runs the same burst of `UPDATE` statements through several SQL drivers
//! and prints, per driver, how many errors were reported next to how many
//! updates the database actually committed.

use std::num::NonZeroUsize;

use anyhow::Context;
use clap::Parser;
use retry_audit_db::config::DEFAULT_MAX_CONNECTIONS;
use retry_audit_db::probe::{
    self, DEFAULT_READ_ATTEMPTS, DEFAULT_RESET_ATTEMPTS, DEFAULT_UPDATE_COUNT, ProbeOptions,
};
use retry_audit_db::{
    Comparison, ConnectionConfig, CounterTable, DbConnection, DriverKind, FaultPlan, OpenOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "retry-audit")]
#[command(about = "Compare SQL driver error reports against committed state")]
#[command(version)]
struct Cli {
    /// Driver to probe; repeat or comma-separate to probe several, in order
    #[arg(
        short,
        long = "driver",
        value_name = "DRIVER",
        env = "RETRY_AUDIT_DRIVERS",
        value_delimiter = ',',
        default_values_t = DriverKind::DEFAULT_PAIR
    )]
    drivers: Vec<DriverKind>,

    /// Update statements executed per driver
    #[arg(short = 'n', long, env = "RETRY_AUDIT_UPDATES", default_value_t = DEFAULT_UPDATE_COUNT)]
    updates: usize,

    /// Attempts at resetting the counter table before giving up
    #[arg(long, env = "RETRY_AUDIT_RESET_ATTEMPTS", default_value_t = DEFAULT_RESET_ATTEMPTS)]
    reset_attempts: usize,

    /// Attempts at reading the counter back before giving up
    #[arg(long, env = "RETRY_AUDIT_READ_ATTEMPTS", default_value_t = DEFAULT_READ_ATTEMPTS)]
    read_attempts: usize,

    /// Pool size for the Postgres drivers
    #[arg(long, env = "RETRY_AUDIT_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: u32,

    /// Database opened by the libsql driver (path, :memory: or libsql:// URL)
    #[arg(long, env = "RETRY_AUDIT_LIBSQL_URL", default_value = ":memory:")]
    libsql_url: String,

    /// Auth token for a remote libsql database
    #[arg(long, env = "RETRY_AUDIT_LIBSQL_AUTH_TOKEN", hide_env_values = true)]
    libsql_auth_token: Option<String>,

    /// Make every n-th update of the memory driver report an error
    #[arg(long, value_name = "N", env = "RETRY_AUDIT_MEMORY_FAIL_EVERY")]
    memory_fail_every: Option<NonZeroUsize>,

    /// Apply failing memory-driver updates before reporting the error
    #[arg(long, requires = "memory_fail_every")]
    memory_commit_failed: bool,

    /// Print one JSON object per driver instead of text
    #[arg(long, conflicts_with = "summary")]
    json: bool,

    /// Print a comparison of all drivers after the runs
    #[arg(long)]
    summary: bool,
}

impl Cli {
    fn probe_options(&self) -> ProbeOptions {
        ProbeOptions::default()
            .with_update_count(self.updates)
            .with_reset_attempts(self.reset_attempts)
            .with_read_attempts(self.read_attempts)
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::default()
            .with_libsql_url(self.libsql_url.clone())
            .with_faults(FaultPlan {
                fail_every: self.memory_fail_every,
                commit_failed: self.memory_commit_failed,
                ..FaultPlan::default()
            });
        if let Some(token) = &self.libsql_auth_token {
            options = options.with_libsql_auth_token(token.clone());
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ConnectionConfig::from_env()
        .context("extract config failed")?
        .with_max_connections(cli.max_connections);
    let options = cli.probe_options();
    options.validate().context("invalid probe options")?;
    tracing::debug!(?config, ?options, drivers = ?cli.drivers, "starting");

    let open_options = cli.open_options();
    let mut connections = Vec::with_capacity(cli.drivers.len());
    for driver in &cli.drivers {
        let connection = DbConnection::open(*driver, &config, &open_options)
            .await
            .with_context(|| format!("open {driver} failed"))?;
        connections.push(connection);
    }

    let table = CounterTable::default();
    let mut reports = Vec::with_capacity(connections.len());
    for connection in &connections {
        let driver = connection.driver();
        probe::reset_schema(connection, &table, options.reset_attempts)
            .await
            .context("reset schema failed")?;

        if !cli.json {
            println!("Testing with {driver}");
        }
        let report = probe::measure(connection, &table, &options)
            .await
            .context("error selecting number of actual updates")?;
        if cli.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{report}");
        }
        reports.push(report);
    }

    if cli.summary {
        println!("{}", Comparison::new(&reports));
    }

    for connection in connections {
        connection.close().await;
    }
    Ok(())
}
