//! Schema migrations for the user aggregate
//!
//! All timestamps are stored as unix milliseconds. Ids are UUIDs in their
//! hyphenated text form.
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: i64,
}

/// A schema change expressed as a list of statements run in order.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique version number for ordering migrations
    fn version(&self) -> i64;

    /// Human readable name of the migration
    fn name(&self) -> &str;

    fn up_statements(&self) -> &'static [&'static str];

    fn down_statements(&self) -> &'static [&'static str];

    async fn up(&self, conn: &mut SqliteConnection) -> Result<(), MigrationError> {
        for statement in self.up_statements() {
            sqlx::query(*statement).execute(&mut *conn).await?;
        }
        Ok(())
    }

    async fn down(&self, conn: &mut SqliteConnection) -> Result<(), MigrationError> {
        for statement in self.down_statements() {
            sqlx::query(*statement).execute(&mut *conn).await?;
        }
        Ok(())
    }
}

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub const TABLE_NAME: &'static str = "_keystone_migrations";

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize migration tracking table
    pub async fn initialize(&self) -> Result<(), MigrationError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            );"#,
            Self::TABLE_NAME
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply pending migrations, each in its own transaction
    pub async fn up(&self, migrations: &[Box<dyn Migration>]) -> Result<(), MigrationError> {
        let mut versions: Vec<i64> = migrations.iter().map(|m| m.version()).collect();
        versions.sort_unstable();
        versions.dedup();
        if versions.len() != migrations.len() {
            return Err(MigrationError::Migration(
                "duplicate migration version".to_string(),
            ));
        }

        for migration in migrations {
            if self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await?;

            tracing::info!(
                "Applying migration {} ({})",
                migration.name(),
                migration.version()
            );

            migration.up(&mut *tx).await?;

            sqlx::query(&format!(
                "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
                Self::TABLE_NAME
            ))
            .bind(migration.version())
            .bind(migration.name())
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }
        Ok(())
    }

    /// Roll back applied migrations, newest first
    pub async fn down(&self, migrations: &[Box<dyn Migration>]) -> Result<(), MigrationError> {
        for migration in migrations.iter().rev() {
            if !self.is_applied(migration.version()).await? {
                continue;
            }

            let mut tx = self.pool.begin().await?;

            tracing::info!(
                "Rolling back migration {} ({})",
                migration.name(),
                migration.version()
            );

            migration.down(&mut *tx).await?;

            sqlx::query(&format!(
                "DELETE FROM {} WHERE version = ?",
                Self::TABLE_NAME
            ))
            .bind(migration.version())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }
        Ok(())
    }

    pub async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let records = sqlx::query_as::<_, MigrationRecord>(&format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version",
            Self::TABLE_NAME
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn is_applied(&self, version: i64) -> Result<bool, MigrationError> {
        let result: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE version = ?)",
            Self::TABLE_NAME
        ))
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }
}

/// Every migration of this backend, in version order.
pub fn all() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateUsersTable),
        Box::new(CreateEmailTables),
        Box::new(CreateUsernamesTable),
        Box::new(CreateCredentialTables),
        Box::new(CreateUserMetadataTable),
        Box::new(CreateAuditLogsTable),
    ]
}

pub struct CreateUsersTable;

impl Migration for CreateUsersTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateUsersTable"
    }

    fn up_statements(&self) -> &'static [&'static str] {
        &[r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );"#]
    }

    fn down_statements(&self) -> &'static [&'static str] {
        &["DROP TABLE IF EXISTS users"]
    }
}

/// Emails, the primary link and linked identities.
///
/// `primary_emails.user_id` is unique: two flows racing to promote a first
/// email cannot both commit.
pub struct CreateEmailTables;

impl Migration for CreateEmailTables {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateEmailTables"
    }

    fn up_statements(&self) -> &'static [&'static str] {
        &[
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
                address TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(address)
            );"#,
            "CREATE INDEX IF NOT EXISTS idx_emails_user_id ON emails(user_id)",
            r#"
            CREATE TABLE IF NOT EXISTS primary_emails (
                id TEXT PRIMARY KEY,
                email_id TEXT NOT NULL REFERENCES emails(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(email_id),
                UNIQUE(user_id)
            );"#,
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                id TEXT PRIMARY KEY,
                email_id TEXT NOT NULL REFERENCES emails(id) ON DELETE CASCADE,
                provider_id TEXT NOT NULL,
                provider_name TEXT NOT NULL,
                saml_domain TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(provider_id, provider_name)
            );"#,
        ]
    }

    fn down_statements(&self) -> &'static [&'static str] {
        &[
            "DROP TABLE IF EXISTS identities",
            "DROP TABLE IF EXISTS primary_emails",
            "DROP TABLE IF EXISTS emails",
        ]
    }
}

pub struct CreateUsernamesTable;

impl Migration for CreateUsernamesTable {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateUsernamesTable"
    }

    fn up_statements(&self) -> &'static [&'static str] {
        &[r#"
            CREATE TABLE IF NOT EXISTS usernames (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                username TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id),
                UNIQUE(username)
            );"#]
    }

    fn down_statements(&self) -> &'static [&'static str] {
        &["DROP TABLE IF EXISTS usernames"]
    }
}

pub struct CreateCredentialTables;

impl Migration for CreateCredentialTables {
    fn version(&self) -> i64 {
        4
    }

    fn name(&self) -> &str {
        "CreateCredentialTables"
    }

    fn up_statements(&self) -> &'static [&'static str] {
        &[
            r#"
            CREATE TABLE IF NOT EXISTS webauthn_credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT,
                public_key TEXT NOT NULL,
                attestation_type TEXT NOT NULL,
                aaguid TEXT NOT NULL,
                sign_count INTEGER NOT NULL DEFAULT 0,
                backup_eligible INTEGER NOT NULL DEFAULT 0,
                backup_state INTEGER NOT NULL DEFAULT 0,
                mfa_only INTEGER NOT NULL DEFAULT 0,
                last_used_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );"#,
            "CREATE INDEX IF NOT EXISTS idx_webauthn_credentials_user_id ON webauthn_credentials(user_id)",
            r#"
            CREATE TABLE IF NOT EXISTS webauthn_credential_transports (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                webauthn_credential_id TEXT NOT NULL REFERENCES webauthn_credentials(id) ON DELETE CASCADE
            );"#,
            r#"
            CREATE TABLE IF NOT EXISTS password_credentials (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                password TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id)
            );"#,
            r#"
            CREATE TABLE IF NOT EXISTS otp_secrets (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                secret TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id)
            );"#,
        ]
    }

    fn down_statements(&self) -> &'static [&'static str] {
        &[
            "DROP TABLE IF EXISTS otp_secrets",
            "DROP TABLE IF EXISTS password_credentials",
            "DROP TABLE IF EXISTS webauthn_credential_transports",
            "DROP TABLE IF EXISTS webauthn_credentials",
        ]
    }
}

pub struct CreateUserMetadataTable;

impl Migration for CreateUserMetadataTable {
    fn version(&self) -> i64 {
        5
    }

    fn name(&self) -> &str {
        "CreateUserMetadataTable"
    }

    fn up_statements(&self) -> &'static [&'static str] {
        &[r#"
            CREATE TABLE IF NOT EXISTS user_metadata (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                public_metadata TEXT,
                private_metadata TEXT,
                unsafe_metadata TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id)
            );"#]
    }

    fn down_statements(&self) -> &'static [&'static str] {
        &["DROP TABLE IF EXISTS user_metadata"]
    }
}

/// Audit entries outlive the users they describe, so there are no foreign keys.
pub struct CreateAuditLogsTable;

impl Migration for CreateAuditLogsTable {
    fn version(&self) -> i64 {
        6
    }

    fn name(&self) -> &str {
        "CreateAuditLogsTable"
    }

    fn up_statements(&self) -> &'static [&'static str] {
        &[
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                subject_user_id TEXT,
                actor_user_id TEXT,
                request_id TEXT,
                ip_address TEXT,
                user_agent TEXT,
                details TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );"#,
            "CREATE INDEX IF NOT EXISTS idx_audit_logs_subject ON audit_logs(subject_user_id)",
        ]
    }

    fn down_statements(&self) -> &'static [&'static str] {
        &["DROP TABLE IF EXISTS audit_logs"]
    }
}
