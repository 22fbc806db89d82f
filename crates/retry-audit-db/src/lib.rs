//! # retry-audit-db
//!
//! Driver backends and the probe procedure for auditing how SQL drivers
//! report errors.
//!
//! A probe resets a single-row counter table, issues a fixed number of
//! sequential `UPDATE` statements through one driver, counts the errors the
//! driver reported and reads back how many increments were actually
//! committed. Running the same probe through two drivers against the same
//! database exposes drivers whose error reports disagree with the data.

pub mod config;
pub mod connection;
pub mod driver;
#[cfg(feature = "memory")]
pub mod memory;
pub mod probe;
pub mod report;
pub mod schema;

pub use config::ConnectionConfig;
pub use connection::{DbConnection, OpenOptions};
pub use driver::{DriverKind, ParseDriverError};
#[cfg(feature = "memory")]
pub use memory::FaultPlan;
pub use probe::{ProbeOptions, UpdateTally};
pub use report::{Comparison, ProbeReport};
pub use schema::CounterTable;

use thiserror::Error;

/// Errors that can occur while probing a driver.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("Postgres error during {context}: {source}")]
    Postgres {
        context: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Connection pool error during {context}: {source}")]
    Pool {
        context: String,
        #[source]
        source: bb8::RunError<tokio_postgres::Error>,
    },

    #[error("Sqlx error during {context}: {source}")]
    Sqlx {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Libsql error during {context}: {source}")]
    Libsql {
        context: String,
        #[source]
        source: libsql::Error,
    },

    #[error("Query error on `{table}`: {details}")]
    Query { table: String, details: String },

    #[error("Injected fault: {details}")]
    Fault { details: String },

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        attempts: usize,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
