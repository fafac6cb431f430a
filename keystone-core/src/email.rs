use crate::{UserId, error::ValidationError, validation::validate_email};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An email address owned by a user.
///
/// `address` is unique across all users. `user_id` is `None` only for
/// orphaned rows, which are never resolved to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub address: String,
    pub verified: bool,
    pub primary_email: Option<PrimaryEmail>,
    pub identities: Vec<Identity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Email {
    /// A new, unverified email owned by `user_id`.
    pub fn new(user_id: UserId, address: impl Into<String>) -> Self {
        let now = crate::now();
        Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            address: address.into(),
            verified: false,
            primary_email: None,
            identities: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }

    pub fn is_primary(&self) -> bool {
        self.primary_email.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_email(&self.address)?;

        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidField(
                "updated_at: must not precede created_at".to_string(),
            ));
        }

        Ok(())
    }
}

/// Designates one of a user's emails as primary. At most one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryEmail {
    pub id: Uuid,
    pub email_id: Uuid,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PrimaryEmail {
    pub fn new(email_id: Uuid, user_id: UserId) -> Self {
        let now = crate::now();
        Self {
            id: Uuid::new_v4(),
            email_id,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A third-party identity that was linked through one of the user's emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email_id: Uuid,
    pub provider_id: String,
    pub provider_name: String,
    /// Set when the identity came from a SAML provider.
    pub saml_domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_email_is_unverified() {
        let email = Email::new(UserId::new_random(), "a@x.com");
        assert!(!email.verified);
        assert!(!email.is_primary());
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_new_timestamps_have_storage_precision() {
        let email = Email::new(UserId::new_random(), "a@x.com");
        let primary = PrimaryEmail::new(email.id, UserId::new_random());

        for at in [email.created_at, primary.created_at] {
            assert_eq!(at.timestamp_subsec_nanos() % 1_000_000, 0);
            assert_eq!(DateTime::from_timestamp_millis(at.timestamp_millis()), Some(at));
        }
    }

    #[test]
    fn test_email_validation_reports_address() {
        let email = Email::new(UserId::new_random(), "not an email");
        let err = email.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidEmail(_)));
        assert!(err.to_string().contains("address"));
    }
}
