//! The User aggregate
//!
//! A [`User`] owns every sub-entity hanging off it. Deleting the user removes
//! all of them.
//!
//! | Field                  | Type                         | Description                                   |
//! | ---------------------- | ---------------------------- | --------------------------------------------- |
//! | `id`                   | `UserId`                     | The unique identifier for the user.           |
//! | `emails`               | `Vec<Email>`                 | Owned email addresses, in creation order.     |
//! | `webauthn_credentials` | `Vec<WebauthnCredential>`    | Passkeys and security keys.                   |
//! | `username`             | `Option<Username>`           | Optional login name.                          |
//! | `password_credential`  | `Option<PasswordCredential>` | Password hash, if one was set.                |
//! | `otp_secret`           | `Option<OtpSecret>`          | TOTP secret, if the user enrolled one.        |
//! | `metadata`             | `Option<UserMetadata>`       | Free-form JSON metadata.                      |
//! | `created_at`           | `DateTime`                   | The timestamp when the user was created.      |
//! | `updated_at`           | `DateTime`                   | The timestamp when the user was last updated. |
use crate::{
    credential::WebauthnCredential,
    email::{Email, PrimaryEmail},
    error::ValidationError,
    validation::validate_username,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// A unique, stable identifier for a specific user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        UserId(id)
    }

    pub fn new_random() -> Self {
        UserId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_inner(self) -> Uuid {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(UserId)
            .map_err(|e| ValidationError::InvalidUserId(format!("{s}: {e}")))
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity aggregate.
///
/// Which sub-entities are populated depends on the query that produced the
/// value; see the hydration notes on
/// [`UserRepository`](crate::repositories::UserRepository).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub emails: Vec<Email>,
    pub webauthn_credentials: Vec<WebauthnCredential>,
    pub username: Option<Username>,
    pub password_credential: Option<PasswordCredential>,
    pub otp_secret: Option<OtpSecret>,
    pub metadata: Option<UserMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn builder() -> UserBuilder {
        UserBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_nil() {
            return Err(ValidationError::InvalidUserId(
                "id: must not be nil".to_string(),
            ));
        }

        if self.updated_at < self.created_at {
            return Err(ValidationError::InvalidField(
                "updated_at: must not precede created_at".to_string(),
            ));
        }

        Ok(())
    }

    /// The email currently designated as primary, if any.
    pub fn primary_email(&self) -> Option<&Email> {
        self.emails.iter().find(|email| email.is_primary())
    }

    pub fn email_by_address(&self, address: &str) -> Option<&Email> {
        self.emails.iter().find(|email| email.address == address)
    }

    /// Point the primary link at the email `primary.email_id` refers to.
    ///
    /// The link is cleared from every other email so the in-memory view keeps
    /// the one-primary-per-user shape the store enforces.
    pub fn set_primary_email(&mut self, primary: PrimaryEmail) {
        for email in &mut self.emails {
            if email.id == primary.email_id {
                email.primary_email = Some(primary.clone());
            } else {
                email.primary_email = None;
            }
        }
    }

    /// Replace the email with the same id. Returns `false` when the view does
    /// not hold that email.
    pub fn update_email(&mut self, updated: Email) -> bool {
        match self.emails.iter_mut().find(|email| email.id == updated.id) {
            Some(email) => {
                *email = updated;
                true
            }
            None => false,
        }
    }

    pub fn has_otp_secret(&self) -> bool {
        self.otp_secret.is_some()
    }

    /// Credentials registered as a second factor only.
    pub fn mfa_credentials(&self) -> impl Iterator<Item = &WebauthnCredential> {
        self.webauthn_credentials.iter().filter(|c| c.mfa_only)
    }

    pub fn passkeys(&self) -> impl Iterator<Item = &WebauthnCredential> {
        self.webauthn_credentials.iter().filter(|c| !c.mfa_only)
    }

    /// Users without any email or username cannot be listed or counted.
    pub fn is_complete(&self) -> bool {
        !self.emails.is_empty() || self.username.is_some()
    }
}

#[derive(Default)]
pub struct UserBuilder {
    id: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl UserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Build a user with no sub-entities.
    pub fn build(self) -> Result<User, ValidationError> {
        let now = crate::now();
        let created_at = self.created_at.unwrap_or(now);
        let user = User {
            id: self.id.unwrap_or_default(),
            emails: Vec::new(),
            webauthn_credentials: Vec::new(),
            username: None,
            password_credential: None,
            otp_secret: None,
            metadata: None,
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        };
        user.validate()?;
        Ok(user)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Username {
    pub id: Uuid,
    pub user_id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Username {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        let now = crate::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            username: username.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_username(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCredential {
    pub id: Uuid,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSecret {
    pub id: Uuid,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-form metadata, split by who may read and write it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub id: Uuid,
    pub user_id: UserId,
    pub public_metadata: Option<serde_json::Value>,
    pub private_metadata: Option<serde_json::Value>,
    pub unsafe_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
