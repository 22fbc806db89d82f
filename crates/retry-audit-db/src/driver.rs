//! Driver paths a probe can run through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A client library together with the way it is configured and pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    /// `tokio-postgres` behind a `bb8` pool, configured from a libpq
    /// keyword/value string.
    TokioPostgres,
    /// `sqlx` Postgres pool, configured from typed connect options.
    Sqlx,
    /// libsql database opened from a URL.
    Libsql,
    /// In-process counter with optional fault injection.
    #[cfg(feature = "memory")]
    Memory,
}

impl DriverKind {
    /// The pair compared when no driver is selected explicitly.
    pub const DEFAULT_PAIR: [DriverKind; 2] = [DriverKind::TokioPostgres, DriverKind::Sqlx];

    pub fn all() -> &'static [DriverKind] {
        &[
            DriverKind::TokioPostgres,
            DriverKind::Sqlx,
            DriverKind::Libsql,
            #[cfg(feature = "memory")]
            DriverKind::Memory,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::TokioPostgres => "tokio-postgres",
            DriverKind::Sqlx => "sqlx",
            DriverKind::Libsql => "libsql",
            #[cfg(feature = "memory")]
            DriverKind::Memory => "memory",
        }
    }

    /// Whether the driver talks to the PostgreSQL server from the environment.
    pub fn uses_postgres(&self) -> bool {
        matches!(self, DriverKind::TokioPostgres | DriverKind::Sqlx)
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a driver label is not recognized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown driver '{label}', expected one of: {expected}")]
pub struct ParseDriverError {
    pub label: String,
    pub expected: String,
}

impl FromStr for DriverKind {
    type Err = ParseDriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        DriverKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == label)
            .ok_or_else(|| ParseDriverError {
                label: s.to_string(),
                expected: DriverKind::all()
                    .iter()
                    .map(DriverKind::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
