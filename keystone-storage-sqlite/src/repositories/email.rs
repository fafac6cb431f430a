use async_trait::async_trait;
use keystone_core::{
    Email, Error, PrimaryEmail, UserId,
    error::{StorageError, ValidationError},
    repositories::{EmailRepository, PrimaryEmailRepository},
};
use sqlx::SqliteConnection;

use crate::error::db_error;
use crate::models::{SqliteEmail, SqlitePrimaryEmail};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEmailRepository;

impl SqliteEmailRepository {
    pub fn new() -> Self {
        Self
    }
}

async fn with_primary_link(conn: &mut SqliteConnection, row: SqliteEmail) -> Result<Email, Error> {
    let mut email = Email::try_from(row)?;

    let primary = sqlx::query_as::<_, SqlitePrimaryEmail>(
        "SELECT * FROM primary_emails WHERE email_id = ?1",
    )
    .bind(email.id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("Failed to fetch primary email"))?;

    email.primary_email = primary.map(PrimaryEmail::try_from).transpose()?;
    Ok(email)
}

#[async_trait]
impl EmailRepository for SqliteEmailRepository {
    type Tx = SqliteConnection;

    async fn find_by_address(
        &self,
        tx: &mut Self::Tx,
        address: &str,
    ) -> Result<Option<Email>, Error> {
        let row = sqlx::query_as::<_, SqliteEmail>("SELECT * FROM emails WHERE address = ?1")
            .bind(address)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to fetch email"))?;

        match row {
            Some(row) => Ok(Some(with_primary_link(tx, row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_user_id(
        &self,
        tx: &mut Self::Tx,
        user_id: &UserId,
    ) -> Result<Vec<Email>, Error> {
        let rows = sqlx::query_as::<_, SqliteEmail>(
            "SELECT * FROM emails WHERE user_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(user_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("Failed to fetch emails"))?;

        let mut emails = Vec::with_capacity(rows.len());
        for row in rows {
            emails.push(with_primary_link(tx, row).await?);
        }
        Ok(emails)
    }

    async fn create(&self, tx: &mut Self::Tx, email: &Email) -> Result<(), Error> {
        email.validate()?;

        sqlx::query(
            r#"
            INSERT INTO emails (id, user_id, address, verified, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(email.id.to_string())
        .bind(email.user_id.map(|id| id.to_string()))
        .bind(&email.address)
        .bind(email.verified)
        .bind(email.created_at.timestamp_millis())
        .bind(email.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to create email"))?;

        tracing::debug!(email_id = %email.id, verified = email.verified, "Created email");
        Ok(())
    }

    async fn update(&self, tx: &mut Self::Tx, email: &Email) -> Result<(), Error> {
        email.validate()?;

        if !email.verified {
            let is_primary: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM primary_emails WHERE email_id = ?1)",
            )
            .bind(email.id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to check primary email link"))?;

            if is_primary {
                return Err(Error::Validation(ValidationError::InvalidField(
                    "verified: a primary email must stay verified".to_string(),
                )));
            }
        }

        // Owner and address are fixed at creation.
        let result = sqlx::query("UPDATE emails SET verified = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(email.id.to_string())
            .bind(email.verified)
            .bind(email.updated_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to update email"))?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlitePrimaryEmailRepository;

impl SqlitePrimaryEmailRepository {
    pub fn new() -> Self {
        Self
    }

    /// A primary link may only point at a verified email of the same user.
    async fn ensure_promotable(
        conn: &mut SqliteConnection,
        primary_email: &PrimaryEmail,
    ) -> Result<(), Error> {
        let promotable: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM emails WHERE id = ?1 AND user_id = ?2 AND verified = 1)",
        )
        .bind(primary_email.email_id.to_string())
        .bind(primary_email.user_id.to_string())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error("Failed to check primary email target"))?;

        if !promotable {
            return Err(Error::Validation(ValidationError::InvalidField(
                "primary_email: target must be a verified email of the same user".to_string(),
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl PrimaryEmailRepository for SqlitePrimaryEmailRepository {
    type Tx = SqliteConnection;

    async fn create(&self, tx: &mut Self::Tx, primary_email: &PrimaryEmail) -> Result<(), Error> {
        Self::ensure_promotable(tx, primary_email).await?;

        sqlx::query(
            r#"
            INSERT INTO primary_emails (id, email_id, user_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(primary_email.id.to_string())
        .bind(primary_email.email_id.to_string())
        .bind(primary_email.user_id.to_string())
        .bind(primary_email.created_at.timestamp_millis())
        .bind(primary_email.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to create primary email"))?;

        tracing::debug!(
            user_id = %primary_email.user_id,
            email_id = %primary_email.email_id,
            "Created primary email"
        );
        Ok(())
    }

    async fn update(&self, tx: &mut Self::Tx, primary_email: &PrimaryEmail) -> Result<(), Error> {
        Self::ensure_promotable(tx, primary_email).await?;

        let result = sqlx::query(
            "UPDATE primary_emails SET email_id = ?2, updated_at = ?3 WHERE id = ?1 AND user_id = ?4",
        )
        .bind(primary_email.id.to_string())
        .bind(primary_email.email_id.to_string())
        .bind(primary_email.updated_at.timestamp_millis())
        .bind(primary_email.user_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update primary email"))?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound));
        }

        Ok(())
    }
}
