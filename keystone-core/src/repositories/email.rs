use crate::{Email, Error, PrimaryEmail, UserId};
use async_trait::async_trait;

/// Row-level access to emails
#[async_trait]
pub trait EmailRepository: Send + Sync + 'static {
    type Tx: Send;

    /// Look up an email by address across all users.
    async fn find_by_address(&self, tx: &mut Self::Tx, address: &str)
    -> Result<Option<Email>, Error>;

    /// All emails owned by `user_id`, oldest first, with their primary link.
    async fn find_by_user_id(&self, tx: &mut Self::Tx, user_id: &UserId)
    -> Result<Vec<Email>, Error>;

    /// Insert a new email. An address already in use is a
    /// [`StorageError::Constraint`](crate::error::StorageError::Constraint).
    async fn create(&self, tx: &mut Self::Tx, email: &Email) -> Result<(), Error>;

    /// Write the verified flag and `updated_at`. Owner and address never
    /// change. Un-verifying a primary email is a validation error.
    async fn update(&self, tx: &mut Self::Tx, email: &Email) -> Result<(), Error>;
}

/// Row-level access to primary email links
#[async_trait]
pub trait PrimaryEmailRepository: Send + Sync + 'static {
    type Tx: Send;

    /// Insert a primary link. A user that already has one is a
    /// [`StorageError::Constraint`](crate::error::StorageError::Constraint).
    async fn create(&self, tx: &mut Self::Tx, primary_email: &PrimaryEmail) -> Result<(), Error>;

    /// Repoint an existing link at another email.
    async fn update(&self, tx: &mut Self::Tx, primary_email: &PrimaryEmail) -> Result<(), Error>;
}
