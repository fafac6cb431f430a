//! SQLite storage backend for keystone
//!
//! Implements the repository contracts and the audit logger of
//! `keystone-core` on top of `sqlx`. Every operation runs on a
//! [`sqlx::SqliteConnection`], so a flow step opens one transaction with
//! [`SqliteRepositoryProvider::begin`] and passes `&mut *tx` to each call.
//!
//! ```rust,no_run
//! use keystone_core::repositories::{RepositoryProvider, UserRepository};
//! use keystone_storage_sqlite::{SqliteRepositoryProvider, SqliteStorageConfig};
//!
//! # async fn run() -> Result<(), keystone_core::Error> {
//! let storage = SqliteRepositoryProvider::connect(&SqliteStorageConfig::default()).await?;
//! storage.migrate().await?;
//!
//! let mut tx = storage.begin().await?;
//! let users = storage.user().all(&mut *tx).await?;
//! # let _ = users;
//! # Ok(())
//! # }
//! ```
mod audit;
mod config;
mod error;
mod loader;
pub mod migrations;
mod models;
pub mod repositories;

pub use audit::SqliteAuditLogger;
pub use config::SqliteStorageConfig;
pub use loader::Hydration;
pub use repositories::{
    SqliteEmailRepository, SqlitePrimaryEmailRepository, SqliteRepositoryProvider,
    SqliteUserRepository, SqliteUsernameRepository,
};
