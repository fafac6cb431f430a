//! Core functionality for the keystone identity service
//!
//! This crate owns the [`User`] aggregate and everything it contains, the
//! repository contracts storage backends implement, and the flow hook that
//! commits a verified email address into a user.
//!
//! It has no database dependency. Backends such as `keystone-storage-sqlite`
//! implement [`RepositoryProvider`](repositories::RepositoryProvider) and
//! [`AuditLogger`](audit::AuditLogger) for their own transaction type.
//!
//! See [`EmailPersistVerifiedStatus`](flow::EmailPersistVerifiedStatus) for
//! the verified-email commit step.
pub mod audit;
pub mod credential;
pub mod email;
pub mod error;
pub mod events;
pub mod flow;
pub mod repositories;
pub mod user;
pub mod validation;

pub use credential::{Transport, WebauthnCredential};
pub use email::{Email, Identity, PrimaryEmail};
pub use error::Error;
pub use user::{OtpSecret, PasswordCredential, User, UserId, UserMetadata, Username};

/// The current time at the millisecond precision storage keeps, so values
/// built in memory compare equal to the same values read back.
pub(crate) fn now() -> chrono::DateTime<chrono::Utc> {
    use chrono::SubsecRound;
    chrono::Utc::now().trunc_subsecs(3)
}
