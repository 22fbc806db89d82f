//! One open handle per driver path, behind a common set of counter operations.

use std::sync::Arc;
use std::time::Duration;

use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use libsql::{Builder, Connection as LibsqlConnection, Database};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tokio_postgres::NoTls;

use crate::config::ConnectionConfig;
use crate::driver::DriverKind;
#[cfg(feature = "memory")]
use crate::memory::{FaultPlan, MemoryState};
use crate::schema::CounterTable;
use crate::{Error, Result};

const DEFAULT_LIBSQL_URL: &str = ":memory:";

/// Settings for the non-Postgres driver paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub libsql_url: String,
    pub libsql_auth_token: Option<String>,
    #[cfg(feature = "memory")]
    pub faults: FaultPlan,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            libsql_url: DEFAULT_LIBSQL_URL.to_string(),
            libsql_auth_token: None,
            #[cfg(feature = "memory")]
            faults: FaultPlan::default(),
        }
    }
}

impl OpenOptions {
    pub fn with_libsql_url(mut self, url: impl Into<String>) -> Self {
        self.libsql_url = url.into();
        self
    }

    pub fn with_libsql_auth_token(mut self, token: impl Into<String>) -> Self {
        self.libsql_auth_token = Some(token.into());
        self
    }

    #[cfg(feature = "memory")]
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }
}

#[derive(Clone)]
pub struct DbConnection {
    driver: DriverKind,
    backend: DbBackend,
}

#[derive(Clone)]
enum DbBackend {
    TokioPostgres(Pool<PostgresConnectionManager<NoTls>>),
    Sqlx(PgPool),
    Libsql(LibsqlHandle),
    #[cfg(feature = "memory")]
    Memory(Arc<MemoryState>),
}

#[derive(Clone)]
struct LibsqlHandle {
    // Keep the Database alive for as long as the connection is used.
    _database: Arc<Database>,
    connection: LibsqlConnection,
}

impl DbConnection {
    /// Open `driver` and verify that it can reach its database.
    pub async fn open(
        driver: DriverKind,
        config: &ConnectionConfig,
        options: &OpenOptions,
    ) -> Result<Self> {
        if driver.uses_postgres() {
            config.validate()?;
        }

        let backend = match driver {
            DriverKind::TokioPostgres => {
                DbBackend::TokioPostgres(open_tokio_postgres(config).await?)
            }
            DriverKind::Sqlx => DbBackend::Sqlx(open_sqlx(config).await?),
            DriverKind::Libsql => DbBackend::Libsql(open_libsql(options).await?),
            #[cfg(feature = "memory")]
            DriverKind::Memory => {
                DbBackend::Memory(Arc::new(MemoryState::new(options.faults.clone())))
            }
        };
        tracing::info!(%driver, "opened driver");

        Ok(Self { driver, backend })
    }

    /// In-process backend, mostly for tests.
    #[cfg(feature = "memory")]
    pub fn memory(faults: FaultPlan) -> Self {
        Self {
            driver: DriverKind::Memory,
            backend: DbBackend::Memory(Arc::new(MemoryState::new(faults))),
        }
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }

    /// Drop and recreate the counter table holding a single zero row.
    pub async fn reset_counter(&self, table: &CounterTable) -> Result<()> {
        match &self.backend {
            DbBackend::TokioPostgres(pool) => {
                let sql = table.reset_sql();
                let client = pool.get().await.map_err(|source| Error::Pool {
                    context: "acquire connection".to_string(),
                    source,
                })?;
                client
                    .batch_execute(&sql)
                    .await
                    .map_err(|source| Error::Postgres {
                        context: format!("execute `{sql}`"),
                        source,
                    })
            }
            DbBackend::Sqlx(pool) => {
                let sql = table.reset_sql();
                sqlx::raw_sql(&sql)
                    .execute(pool)
                    .await
                    .map_err(|source| Error::Sqlx {
                        context: format!("execute `{sql}`"),
                        source,
                    })?;
                Ok(())
            }
            DbBackend::Libsql(handle) => {
                let sql = table.reset_sql();
                handle
                    .connection
                    .execute_batch(&sql)
                    .await
                    .map_err(|source| Error::Libsql {
                        context: format!("execute `{sql}`"),
                        source,
                    })?;
                Ok(())
            }
            #[cfg(feature = "memory")]
            DbBackend::Memory(state) => state.reset(table).await,
        }
    }

    /// Execute one increment statement; returns the rows it affected.
    pub async fn increment_counter(&self, table: &CounterTable) -> Result<u64> {
        match &self.backend {
            DbBackend::TokioPostgres(pool) => {
                let sql = table.increment_sql();
                let client = pool.get().await.map_err(|source| Error::Pool {
                    context: "acquire connection".to_string(),
                    source,
                })?;
                client
                    .execute(sql.as_str(), &[])
                    .await
                    .map_err(|source| Error::Postgres {
                        context: format!("execute `{sql}`"),
                        source,
                    })
            }
            DbBackend::Sqlx(pool) => {
                let sql = table.increment_sql();
                let result = sqlx::query(&sql)
                    .execute(pool)
                    .await
                    .map_err(|source| Error::Sqlx {
                        context: format!("execute `{sql}`"),
                        source,
                    })?;
                Ok(result.rows_affected())
            }
            DbBackend::Libsql(handle) => {
                let sql = table.increment_sql();
                handle
                    .connection
                    .execute(&sql, ())
                    .await
                    .map_err(|source| Error::Libsql {
                        context: format!("execute `{sql}`"),
                        source,
                    })
            }
            #[cfg(feature = "memory")]
            DbBackend::Memory(state) => state.increment(table).await,
        }
    }

    /// Read the counter value; a missing row is an error.
    pub async fn read_counter(&self, table: &CounterTable) -> Result<i64> {
        match &self.backend {
            DbBackend::TokioPostgres(pool) => {
                let sql = table.select_sql();
                let client = pool.get().await.map_err(|source| Error::Pool {
                    context: "acquire connection".to_string(),
                    source,
                })?;
                let row = client
                    .query_one(sql.as_str(), &[])
                    .await
                    .map_err(|source| Error::Postgres {
                        context: format!("query `{sql}`"),
                        source,
                    })?;
                let value: i32 = row.try_get(0).map_err(|source| Error::Postgres {
                    context: format!("decode `{}`", table.column()),
                    source,
                })?;
                Ok(i64::from(value))
            }
            DbBackend::Sqlx(pool) => {
                let sql = table.select_sql();
                let value: i32 = sqlx::query_scalar(&sql)
                    .fetch_one(pool)
                    .await
                    .map_err(|source| Error::Sqlx {
                        context: format!("query `{sql}`"),
                        source,
                    })?;
                Ok(i64::from(value))
            }
            DbBackend::Libsql(handle) => {
                let sql = table.select_sql();
                let mut rows = handle
                    .connection
                    .query(&sql, ())
                    .await
                    .map_err(|source| Error::Libsql {
                        context: format!("query `{sql}`"),
                        source,
                    })?;
                let row = rows
                    .next()
                    .await
                    .map_err(|source| Error::Libsql {
                        context: format!("fetch `{sql}`"),
                        source,
                    })?
                    .ok_or_else(|| Error::Query {
                        table: table.name().to_string(),
                        details: "Counter row is missing".to_string(),
                    })?;
                row.get::<i64>(0).map_err(|source| Error::Libsql {
                    context: format!("decode `{}`", table.column()),
                    source,
                })
            }
            #[cfg(feature = "memory")]
            DbBackend::Memory(state) => state.read(table).await,
        }
    }

    /// Release pooled connections.
    pub async fn close(self) {
        let driver = self.driver;
        match self.backend {
            DbBackend::Sqlx(pool) => pool.close().await,
            DbBackend::TokioPostgres(pool) => drop(pool),
            DbBackend::Libsql(handle) => drop(handle),
            #[cfg(feature = "memory")]
            DbBackend::Memory(_) => {}
        }
        tracing::debug!(%driver, "closed driver");
    }
}

async fn open_tokio_postgres(
    config: &ConnectionConfig,
) -> Result<Pool<PostgresConnectionManager<NoTls>>> {
    let pg_config: tokio_postgres::Config = config
        .key_value_string()
        .parse()
        .map_err(|source| Error::Postgres {
            context: "parse connection string".to_string(),
            source,
        })?;
    let manager = PostgresConnectionManager::new(pg_config, NoTls);

    let mut builder = Pool::builder().max_size(config.max_connections);
    if let Some(timeout) = config.connect_timeout {
        builder = builder.connection_timeout(timeout);
    }
    let pool = builder.build(manager).await.map_err(|source| Error::Postgres {
        context: "build connection pool".to_string(),
        source,
    })?;

    // Fail at open time rather than on the first statement.
    pool.get().await.map_err(|source| Error::Pool {
        context: format!("connect to {}:{}", config.host, config.port),
        source,
    })?;
    Ok(pool)
}

async fn open_sqlx(config: &ConnectionConfig) -> Result<PgPool> {
    let mut connect = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database)
        .ssl_mode(PgSslMode::Disable);
    if let Some(password) = &config.password {
        connect = connect.password(password);
    }

    let mut pool = PgPoolOptions::new().max_connections(config.max_connections);
    if let Some(timeout) = config.connect_timeout {
        pool = pool.acquire_timeout(timeout);
    }
    pool.connect_with(connect)
        .await
        .map_err(|source| Error::Sqlx {
            context: format!("connect to {}:{}", config.host, config.port),
            source,
        })
}

async fn open_libsql(options: &OpenOptions) -> Result<LibsqlHandle> {
    let url = options.libsql_url.trim();
    if url.is_empty() {
        return Err(Error::Config {
            details: "libsql_url must be provided".to_string(),
        });
    }

    let database = if is_remote_url(url) {
        let token = options.libsql_auth_token.clone().ok_or_else(|| Error::Config {
            details: "libsql_auth_token is required for remote databases".to_string(),
        })?;
        Builder::new_remote(url.to_string(), token)
            .build()
            .await
            .map_err(|source| Error::Libsql {
                context: "open remote database".to_string(),
                source,
            })?
    } else {
        let path = url.strip_prefix("file:").unwrap_or(url);
        Builder::new_local(path)
            .build()
            .await
            .map_err(|source| Error::Libsql {
                context: "open local database".to_string(),
                source,
            })?
    };

    let connection = database.connect().map_err(|source| Error::Libsql {
        context: "connect database".to_string(),
        source,
    })?;
    if !is_remote_url(url) {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|source| Error::Libsql {
                context: "set busy timeout".to_string(),
                source,
            })?;
    }

    Ok(LibsqlHandle {
        _database: Arc::new(database),
        connection,
    })
}

fn is_remote_url(url: &str) -> bool {
    url.starts_with("libsql://") || url.starts_with("https://") || url.starts_with("http://")
}
