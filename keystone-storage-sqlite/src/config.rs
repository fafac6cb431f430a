use std::str::FromStr;
use std::time::Duration;

use keystone_core::{Error, error::StorageError};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Connection settings for the SQLite backend.
///
/// # Example
///
/// ```rust
/// use keystone_storage_sqlite::SqliteStorageConfig;
///
/// let config = SqliteStorageConfig::new("sqlite://keystone.db").max_connections(4);
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// e.g. `sqlite://keystone.db` or `sqlite::memory:`
    pub database_url: String,
    /// Pool size. In-memory databases are private to a connection, so keep
    /// this at 1 for them.
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
        }
    }
}

impl SqliteStorageConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }

    /// Open a pool with foreign keys enforced, which the aggregate's cascading
    /// deletes rely on.
    pub async fn connect(&self) -> Result<SqlitePool, Error> {
        let options = SqliteConnectOptions::from_str(&self.database_url)
            .map_err(|e| {
                tracing::error!(error = %e, "Invalid SQLite connection string");
                Error::Storage(StorageError::Connection(format!(
                    "invalid database url: {e}"
                )))
            })?
            .create_if_missing(self.create_if_missing)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout);

        let mut pool_options = SqlitePoolOptions::new().max_connections(self.max_connections);
        if self.is_in_memory() {
            // Dropping the last connection drops the database with it.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        pool_options.connect_with(options).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            Error::Storage(StorageError::Connection(
                "Failed to connect to SQLite".to_string(),
            ))
        })
    }
}
