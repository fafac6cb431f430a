//! Repository traits for data access layer
//!
//! Every repository operation takes the caller's open transaction as `&mut Tx`
//! so that a flow step can combine reads and writes across repositories into
//! one atomic unit. The transaction type is chosen by the storage backend.
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - [`RepositoryProvider`] hands out all of them, bound to one transaction type

pub mod email;
pub mod user;
pub mod username;

pub use email::{EmailRepository, PrimaryEmailRepository};
pub use user::{SortDirection, UserFilter, UserListQuery, UserRepository};
pub use username::UsernameRepository;

use async_trait::async_trait;

use crate::Error;

/// Unified access to every repository of a storage backend.
#[async_trait]
pub trait RepositoryProvider: Send + Sync + 'static {
    /// The transaction handle every repository operates on
    type Tx: Send;

    type UserRepo: UserRepository<Tx = Self::Tx>;
    type EmailRepo: EmailRepository<Tx = Self::Tx>;
    type PrimaryEmailRepo: PrimaryEmailRepository<Tx = Self::Tx>;
    type UsernameRepo: UsernameRepository<Tx = Self::Tx>;

    fn user(&self) -> &Self::UserRepo;

    fn email(&self) -> &Self::EmailRepo;

    fn primary_email(&self) -> &Self::PrimaryEmailRepo;

    fn username(&self) -> &Self::UsernameRepo;

    /// Apply pending schema migrations
    async fn migrate(&self) -> Result<(), Error>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<(), Error>;
}
