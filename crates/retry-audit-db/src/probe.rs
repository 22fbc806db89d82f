//! The probe: reset, run updates, count reported errors, read back.

use std::future::Future;

use crate::connection::DbConnection;
use crate::report::ProbeReport;
use crate::schema::CounterTable;
use crate::{Error, Result};

pub const DEFAULT_UPDATE_COUNT: usize = 10_000;
pub const DEFAULT_RESET_ATTEMPTS: usize = 100;
pub const DEFAULT_READ_ATTEMPTS: usize = 100;

/// How many statements a probe issues and how often it retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOptions {
    pub update_count: usize,
    pub reset_attempts: usize,
    pub read_attempts: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            update_count: DEFAULT_UPDATE_COUNT,
            reset_attempts: DEFAULT_RESET_ATTEMPTS,
            read_attempts: DEFAULT_READ_ATTEMPTS,
        }
    }
}

impl ProbeOptions {
    pub fn with_update_count(mut self, update_count: usize) -> Self {
        self.update_count = update_count;
        self
    }

    pub fn with_reset_attempts(mut self, attempts: usize) -> Self {
        self.reset_attempts = attempts;
        self
    }

    pub fn with_read_attempts(mut self, attempts: usize) -> Self {
        self.read_attempts = attempts;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.reset_attempts == 0 {
            return Err(Error::Config {
                details: "reset_attempts must be greater than zero".to_string(),
            });
        }
        if self.read_attempts == 0 {
            return Err(Error::Config {
                details: "read_attempts must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of the update loop as the driver reported it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateTally {
    pub executed: usize,
    pub reported_errors: usize,
}

/// Reset the counter table, retrying immediately up to `attempts` times.
pub async fn reset_schema(
    connection: &DbConnection,
    table: &CounterTable,
    attempts: usize,
) -> Result<()> {
    retry("reset schema", attempts, move || connection.reset_counter(table)).await?;
    tracing::info!(driver = %connection.driver(), table = table.name(), "schema reset");
    Ok(())
}

/// Execute `count` increments one after another.
///
/// Errors are counted, never returned: observing them is the point.
pub async fn run_updates(
    connection: &DbConnection,
    table: &CounterTable,
    count: usize,
) -> UpdateTally {
    let mut tally = UpdateTally::default();
    for sequence in 0..count {
        tally.executed += 1;
        if let Err(err) = connection.increment_counter(table).await {
            tally.reported_errors += 1;
            tracing::debug!(sequence, error = %err, "update reported an error");
        }
    }
    tracing::info!(
        driver = %connection.driver(),
        executed = tally.executed,
        reported_errors = tally.reported_errors,
        "updates finished"
    );
    tally
}

/// Read the committed counter value with bounded retries.
pub async fn read_back(
    connection: &DbConnection,
    table: &CounterTable,
    attempts: usize,
) -> Result<i64> {
    retry("read counter", attempts, move || connection.read_counter(table)).await
}

/// Run a full probe against one driver.
pub async fn run_probe(
    connection: &DbConnection,
    table: &CounterTable,
    options: &ProbeOptions,
) -> Result<ProbeReport> {
    options.validate()?;
    reset_schema(connection, table, options.reset_attempts).await?;
    measure(connection, table, options).await
}

/// Run the updates and read back, on a table that was already reset.
pub async fn measure(
    connection: &DbConnection,
    table: &CounterTable,
    options: &ProbeOptions,
) -> Result<ProbeReport> {
    let tally = run_updates(connection, table, options.update_count).await;
    let actual_updates = read_back(connection, table, options.read_attempts).await?;

    let report = ProbeReport::new(connection.driver(), tally, actual_updates);
    if !report.is_consistent() {
        tracing::warn!(
            driver = %report.driver,
            discrepancy = report.discrepancy(),
            "reported errors disagree with committed updates"
        );
    }
    Ok(report)
}

async fn retry<T, F, Fut>(operation: &str, attempts: usize, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if attempts == 0 {
        return Err(Error::Config {
            details: format!("{operation}: attempts must be greater than zero"),
        });
    }

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(operation, attempt, error = %err, "attempt failed");
                if attempt == attempts {
                    return Err(Error::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        source: Box::new(err),
                    });
                }
                attempt += 1;
            }
        }
    }
}
