//! Connection parameters read from the libpq environment.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "retry_audit";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL connection parameters shared by every driver path.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub max_connections: u32,
    /// `None` waits as long as the driver does.
    pub connect_timeout: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: None,
            database: database.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: None,
        }
    }

    /// Read `PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`, `PGDATABASE` and
    /// `PGCONNECT_TIMEOUT` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ConnectionConfig::from_env`] with an explicit variable source.
    ///
    /// Empty variables count as unset. The user falls back to `USER`, the
    /// host to `localhost` and the database to `retry_audit`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let host = var("PGHOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match var("PGPORT") {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_PORT,
        };
        let user = var("PGUSER")
            .or_else(|| var("USER"))
            .ok_or_else(|| Error::Config {
                details: "no database user: set PGUSER or USER".to_string(),
            })?;
        // Passwords are taken verbatim, surrounding whitespace included.
        let password = lookup("PGPASSWORD").filter(|value| !value.is_empty());
        let database = var("PGDATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let connect_timeout = match var("PGCONNECT_TIMEOUT") {
            Some(raw) => parse_connect_timeout(&raw)?,
            None => None,
        };

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into()).filter(|value: &String| !value.is_empty());
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config {
                details: "max_connections must be greater than zero".to_string(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(Error::Config {
                details: "host must be provided".to_string(),
            });
        }
        Ok(())
    }

    /// Render a libpq keyword/value connection string.
    ///
    /// TLS is always disabled. The password and timeout only appear when set.
    pub fn key_value_string(&self) -> String {
        let mut options = vec![
            format!("host={}", quote_value(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote_value(&self.user)),
            format!("dbname={}", quote_value(&self.database)),
            "sslmode=disable".to_string(),
        ];
        if let Some(password) = &self.password {
            options.push(format!("password={}", quote_value(password)));
        }
        if let Some(timeout) = self.connect_timeout {
            options.push(format!("connect_timeout={}", timeout.as_secs()));
        }
        options.join(" ")
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::Config {
            details: format!("invalid PGPORT '{raw}': expected a port between 1 and 65535"),
        }),
        Ok(port) => Ok(port),
    }
}

fn parse_connect_timeout(raw: &str) -> Result<Option<Duration>> {
    let seconds = raw.parse::<u64>().map_err(|_| Error::Config {
        details: format!("invalid PGCONNECT_TIMEOUT '{raw}': expected whole seconds"),
    })?;
    // libpq treats zero as "wait indefinitely".
    Ok((seconds > 0).then(|| Duration::from_secs(seconds)))
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
