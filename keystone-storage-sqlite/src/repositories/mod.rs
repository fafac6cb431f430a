//! Repository implementations for SQLite storage
//!
//! Repositories are stateless; every operation runs on the
//! [`SqliteConnection`] the caller passes in, normally `&mut *tx` for a
//! transaction opened with [`SqliteRepositoryProvider::begin`].

pub mod email;
pub mod user;
pub mod username;

pub use email::{SqliteEmailRepository, SqlitePrimaryEmailRepository};
pub use user::SqliteUserRepository;
pub use username::SqliteUsernameRepository;

use async_trait::async_trait;
use keystone_core::{Error, error::StorageError, repositories::RepositoryProvider};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::config::SqliteStorageConfig;
use crate::error::db_error;
use crate::migrations::{self, SqliteMigrationManager};

/// Repository provider implementation for SQLite
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    user: SqliteUserRepository,
    email: SqliteEmailRepository,
    primary_email: SqlitePrimaryEmailRepository,
    username: SqliteUsernameRepository,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            user: SqliteUserRepository::new(),
            email: SqliteEmailRepository::new(),
            primary_email: SqlitePrimaryEmailRepository::new(),
            username: SqliteUsernameRepository::new(),
        }
    }

    pub async fn connect(config: &SqliteStorageConfig) -> Result<Self, Error> {
        Ok(Self::new(config.connect().await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction for one flow step.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, Error> {
        self.pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    type Tx = SqliteConnection;

    type UserRepo = SqliteUserRepository;
    type EmailRepo = SqliteEmailRepository;
    type PrimaryEmailRepo = SqlitePrimaryEmailRepository;
    type UsernameRepo = SqliteUsernameRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }

    fn email(&self) -> &Self::EmailRepo {
        &self.email
    }

    fn primary_email(&self) -> &Self::PrimaryEmailRepo {
        &self.primary_email
    }

    fn username(&self) -> &Self::UsernameRepo {
        &self.username
    }

    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error("Health check failed"))?;
        Ok(())
    }
}
